//! MTOM packaging of SOAP envelopes as `multipart/related` XOP messages.

use crate::binding::SoapVersion;
use uuid::Uuid;

const ROOT_CONTENT_ID: &str = "<root.message@zentinel.soap>";

/// True for `multipart/related` content types.
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/related")
}

/// Wrap an envelope as the root part of an XOP package. Returns the content
/// type and the body.
pub fn wrap(envelope: &[u8], version: SoapVersion) -> (String, Vec<u8>) {
    let boundary = format!("uuid:{}", Uuid::new_v4());
    let content_type = format!(
        r#"multipart/related; type="application/xop+xml"; boundary="{}"; start="{}"; start-info="{}""#,
        boundary,
        ROOT_CONTENT_ID,
        version.media_type()
    );

    let mut body = Vec::with_capacity(envelope.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Type: application/xop+xml; charset=UTF-8; type=\"{}\"\r\n",
            version.media_type()
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Transfer-Encoding: binary\r\n");
    body.extend_from_slice(format!("Content-ID: {}\r\n\r\n", ROOT_CONTENT_ID).as_bytes());
    body.extend_from_slice(envelope);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (content_type, body)
}

/// Extract the root part of a multipart package. `None` when the content type
/// carries no boundary or the body holds no part.
pub fn unwrap(content_type: &str, body: &[u8]) -> Option<Vec<u8>> {
    let boundary = boundary(content_type)?;
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let start = find(body, delimiter)? + delimiter.len();
    let part = &body[start..];
    let headers_end = find(part, b"\r\n\r\n")? + 4;
    let content = &part[headers_end..];
    let end = find(content, delimiter)?;

    let content = &content[..end];
    let content = content.strip_suffix(b"\r\n").unwrap_or(content);
    Some(content.to_vec())
}

fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body/></soap:Envelope>"#;

    #[test]
    fn test_wrap_then_unwrap_returns_envelope() {
        let (content_type, body) = wrap(ENVELOPE.as_bytes(), SoapVersion::Soap11);
        assert!(is_multipart(&content_type));
        assert!(content_type.contains(r#"type="application/xop+xml""#));
        assert!(content_type.contains(r#"start-info="text/xml""#));

        let root = unwrap(&content_type, &body).unwrap();
        assert_eq!(root, ENVELOPE.as_bytes());
    }

    #[test]
    fn test_soap12_start_info() {
        let (content_type, body) = wrap(ENVELOPE.as_bytes(), SoapVersion::Soap12);
        assert!(content_type.contains(r#"start-info="application/soap+xml""#));
        assert!(String::from_utf8_lossy(&body).contains(r#"type="application/soap+xml""#));
    }

    #[test]
    fn test_unwrap_requires_boundary() {
        assert!(unwrap("multipart/related", b"--x\r\n\r\nbody\r\n--x--").is_none());
        assert!(!is_multipart("text/xml; charset=utf-8"));
    }
}
