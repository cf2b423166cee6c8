//! Envelope serialization.

use crate::binding::SoapVersion;
use crate::error::xml_escape;
use serde_json::Value;

/// Wrap body content in a SOAP envelope of the given version.
pub fn envelope(version: SoapVersion, header: Option<&str>, body: &str) -> String {
    let header = header
        .map(|h| format!("\n  <soap:Header>{}</soap:Header>", h))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">{}
  <soap:Body>{}</soap:Body>
</soap:Envelope>"#,
        version.namespace(),
        header,
        body
    )
}

/// Operation wrapper element in the service namespace.
pub fn operation_element(name: &str, namespace: &str, content: &str) -> String {
    let name = xml_escape(name);
    format!(
        r#"<ns:{name} xmlns:ns="{}">{content}</ns:{name}>"#,
        xml_escape(namespace)
    )
}

/// Append `value` as element `name`. Arrays repeat the element, objects nest
/// one element per field, `null` writes nothing.
pub fn write_value(name: &str, value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                write_value(name, item, out);
            }
        }
        Value::Object(fields) => {
            out.push_str(&format!("<{}>", name));
            for (field, value) in fields {
                write_value(field, value, out);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::String(s) => out.push_str(&format!("<{name}>{}</{name}>", xml_escape(s))),
        other => out.push_str(&format!("<{name}>{}</{name}>", other)),
    }
}

/// WS-Security header carrying a plain-text UsernameToken.
pub fn username_token_header(username: &str, password: &str) -> String {
    format!(
        r#"<wsse:Security xmlns:wsse="{}"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="{}">{}</wsse:Password></wsse:UsernameToken></wsse:Security>"#,
        crate::parser::WSSE_NS,
        xml_escape(username),
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText",
        xml_escape(password)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_soap_envelope;
    use serde_json::json;

    #[test]
    fn test_envelope_parses_back() {
        let mut content = String::new();
        write_value("arg0", &json!({"name": "A&B", "tags": ["x", "y"], "age": 4}), &mut content);
        let body = operation_element("save", "urn:people", &content);
        let xml = envelope(SoapVersion::Soap12, None, &body);

        let parsed = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(parsed.version, SoapVersion::Soap12);
        assert_eq!(parsed.body.operation.as_deref(), Some("save"));
        assert_eq!(parsed.body.operation_namespace.as_deref(), Some("urn:people"));
        assert_eq!(
            parsed.body.parameters[0].to_value(),
            json!({"name": "A&B", "tags": ["x", "y"], "age": "4"})
        );
    }

    #[test]
    fn test_null_writes_nothing() {
        let mut out = String::new();
        write_value("return", &Value::Null, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_username_token_header_is_read() {
        let xml = envelope(
            SoapVersion::Soap11,
            Some(&username_token_header("alice", "secret")),
            "<foo/>",
        );
        let parsed = parse_soap_envelope(xml.as_bytes()).unwrap();
        let token = parsed.header.unwrap().security.unwrap().username_token.unwrap();
        assert_eq!(token.username, "alice");
        assert_eq!(token.password.as_deref(), Some("secret"));
    }
}
