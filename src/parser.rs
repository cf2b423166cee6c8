//! SOAP XML parsing utilities.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).
//! Documents are read into a small element tree first; the envelope, the
//! WS-Security header and the operation parameters are then read off the tree.

use crate::binding::SoapVersion;
use crate::error::SoapHostError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use serde_json::{Map, Value};

pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// SOAP Header (if present)
    pub header: Option<SoapHeader>,
    /// SOAP Body
    pub body: SoapBody,
}

/// Parsed SOAP Header.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    /// WS-Security header (if present)
    pub security: Option<WsSecurityHeader>,
}

/// Parsed WS-Security header.
#[derive(Debug, Clone, Default)]
pub struct WsSecurityHeader {
    /// Username token
    pub username_token: Option<UsernameToken>,
}

/// WS-Security UsernameToken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    /// Username
    pub username: String,
    /// Password (absent when the token carries none)
    pub password: Option<String>,
    /// Password type URI
    pub password_type: Option<String>,
    /// Nonce (base64 encoded)
    pub nonce: Option<String>,
    /// Created timestamp
    pub created: Option<String>,
}

/// Parsed SOAP Body.
#[derive(Debug, Clone, Default)]
pub struct SoapBody {
    /// First operation element name
    pub operation: Option<String>,
    /// Operation namespace
    pub operation_namespace: Option<String>,
    /// Child elements of the operation element, in document order
    pub parameters: Vec<XmlElement>,
    /// SOAP fault carried in the body, if any
    pub fault: Option<SoapFaultDetail>,
}

/// Code and reason of a SOAP fault found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFaultDetail {
    pub code: String,
    pub reason: String,
}

/// An element of a parsed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub local_name: String,
    pub namespace: Option<String>,
    /// Attributes by local name
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(ns: &ResolveResult, e: &BytesStart) -> Self {
        let attributes = e
            .attributes()
            .flatten()
            .filter_map(|attr| {
                let key = std::str::from_utf8(attr.key.local_name().as_ref()).ok()?.to_string();
                let value = attr.unescape_value().ok()?.into_owned();
                Some((key, value))
            })
            .collect();

        Self {
            local_name: local_name_str(e),
            namespace: namespace_str(ns),
            attributes,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// First child with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name == local_name)
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, local_name: &str) -> Option<&str> {
        self.child(local_name).map(|c| c.text.as_str())
    }

    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert the element content to a JSON value.
    ///
    /// Leaf elements become strings (`null` when empty); elements with children
    /// become objects keyed by child local name, repeated names become arrays.
    pub fn to_value(&self) -> Value {
        if self.children.is_empty() {
            if self.text.is_empty() {
                return Value::Null;
            }
            return Value::String(self.text.clone());
        }

        let mut map = Map::new();
        for child in &self.children {
            let value = child.to_value();
            match map.get_mut(&child.local_name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.local_name.clone(), value);
                }
            }
        }
        Value::Object(map)
    }
}

/// Parse a complete XML document into an element tree.
pub fn parse_document(data: &[u8]) -> Result<XmlElement, SoapHostError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| SoapHostError::XmlParse(format!("Invalid UTF-8: {}", e)))?;

    // Pre-scan for XXE patterns (belt-and-suspenders with quick-xml's safety)
    check_xxe_patterns(xml_str)?;

    let mut reader = NsReader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(ref e))) => {
                stack.push(XmlElement::from_start(&ns, e));
            }
            Ok((ns, Event::Empty(ref e))) => {
                let element = XmlElement::from_start(&ns, e);
                attach(&mut stack, &mut root, element);
            }
            Ok((_, Event::End(_))) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok((_, Event::Text(ref e))) => {
                let text = e
                    .unescape()
                    .map_err(|e| SoapHostError::XmlParse(format!("XML parse error: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok((_, Event::CData(ref e))) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.clone().into_inner()));
                }
            }
            Ok((_, Event::Eof)) => break,
            Err(e) => {
                return Err(SoapHostError::XmlParse(format!("XML parse error: {}", e)));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SoapHostError::XmlParse("Unexpected end of document".to_string()));
    }

    root.ok_or_else(|| SoapHostError::XmlParse("Document has no root element".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Parse raw bytes as SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope, SoapHostError> {
    let root = parse_document(data)?;

    let version = match (root.local_name.as_str(), root.namespace.as_deref()) {
        ("Envelope", Some(ns)) => SoapVersion::from_namespace(ns),
        _ => None,
    }
    .ok_or_else(|| {
        SoapHostError::InvalidEnvelope(
            "No valid SOAP Envelope found with recognized namespace".to_string(),
        )
    })?;

    let envelope_ns = Some(version.namespace());
    let mut header = None;
    let mut body = None;

    for child in &root.children {
        if child.namespace.as_deref() != envelope_ns {
            continue;
        }
        match child.local_name.as_str() {
            "Header" if body.is_none() => header = Some(read_header(child)),
            "Body" => body = Some(read_body(child, version)),
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        SoapHostError::InvalidEnvelope("SOAP Envelope has no Body".to_string())
    })?;

    Ok(SoapEnvelope {
        version,
        header,
        body,
    })
}

fn read_header(element: &XmlElement) -> SoapHeader {
    let security = element
        .children
        .iter()
        .find(|child| child.local_name == "Security" && child.namespace.as_deref() == Some(WSSE_NS))
        .map(read_security);
    SoapHeader { security }
}

fn read_security(element: &XmlElement) -> WsSecurityHeader {
    let username_token = element.child("UsernameToken").map(|token| {
        let password = token.child("Password");
        UsernameToken {
            username: token.child_text("Username").unwrap_or_default().to_string(),
            password: password.map(|p| p.text.clone()),
            password_type: password.and_then(|p| p.attribute("Type")).map(String::from),
            nonce: token.child_text("Nonce").map(String::from),
            created: token.child_text("Created").map(String::from),
        }
    });

    WsSecurityHeader { username_token }
}

fn read_body(element: &XmlElement, version: SoapVersion) -> SoapBody {
    let Some(first) = element.children.first() else {
        return SoapBody::default();
    };

    if first.local_name == "Fault" && first.namespace.as_deref() == Some(version.namespace()) {
        let detail = match version {
            SoapVersion::Soap11 => SoapFaultDetail {
                code: first.child_text("faultcode").unwrap_or_default().to_string(),
                reason: first.child_text("faultstring").unwrap_or_default().to_string(),
            },
            SoapVersion::Soap12 => SoapFaultDetail {
                code: first
                    .child("Code")
                    .and_then(|c| c.child_text("Value"))
                    .unwrap_or_default()
                    .to_string(),
                reason: first
                    .child("Reason")
                    .and_then(|r| r.child_text("Text"))
                    .unwrap_or_default()
                    .to_string(),
            },
        };
        return SoapBody {
            fault: Some(detail),
            ..Default::default()
        };
    }

    SoapBody {
        operation: Some(first.local_name.clone()),
        operation_namespace: first.namespace.clone(),
        parameters: first.children.clone(),
        fault: None,
    }
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> Result<(), SoapHostError> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(SoapHostError::XmlParse(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }

    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(SoapHostError::XmlParse(
            "Entity declarations are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref())
        .unwrap_or("")
        .to_string()
}

fn namespace_str(ns: &ResolveResult) -> Option<String> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => std::str::from_utf8(uri).ok().map(String::from),
        _ => None,
    }
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_11_SAMPLE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <m:Trans xmlns:m="http://example.org/trans" soap:mustUnderstand="1">234</m:Trans>
  </soap:Header>
  <soap:Body>
    <m:GetPrice xmlns:m="http://example.org/stock">
      <m:Item>Apples</m:Item>
      <m:Quantity>3</m:Quantity>
    </m:GetPrice>
  </soap:Body>
</soap:Envelope>"#;

    const SOAP_12_SAMPLE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <m:GetUser xmlns:m="http://example.org/users">
      <m:UserId>123</m:UserId>
    </m:GetUser>
  </soap:Body>
</soap:Envelope>"#;

    const WSSE_SAMPLE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
      <wsse:UsernameToken>
        <wsse:Username>john</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText">secret</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </soap:Header>
  <soap:Body><foo/></soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_soap_11() {
        let envelope = parse_soap_envelope(SOAP_11_SAMPLE.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap11);
        assert!(envelope.header.unwrap().security.is_none());
        assert_eq!(envelope.body.operation, Some("GetPrice".to_string()));
        assert_eq!(
            envelope.body.operation_namespace.as_deref(),
            Some("http://example.org/stock")
        );
        assert_eq!(envelope.body.parameters.len(), 2);
        assert_eq!(envelope.body.parameters[0].text, "Apples");
    }

    #[test]
    fn test_parse_soap_12() {
        let envelope = parse_soap_envelope(SOAP_12_SAMPLE.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap12);
        assert!(envelope.header.is_none());
        assert_eq!(envelope.body.operation, Some("GetUser".to_string()));
    }

    #[test]
    fn test_parse_username_token() {
        let envelope = parse_soap_envelope(WSSE_SAMPLE.as_bytes()).unwrap();
        let token = envelope
            .header
            .and_then(|h| h.security)
            .and_then(|s| s.username_token)
            .unwrap();
        assert_eq!(token.username, "john");
        assert_eq!(token.password.as_deref(), Some("secret"));
        assert!(token.password_type.unwrap().ends_with("#PasswordText"));
        assert_eq!(envelope.body.operation, Some("foo".to_string()));
    }

    #[test]
    fn test_parse_fault_body() {
        let fault = crate::error::soap_fault_response(
            crate::error::FaultCode::Server,
            "it broke",
            SoapVersion::Soap11,
        );
        let envelope = parse_soap_envelope(fault.as_bytes()).unwrap();
        let detail = envelope.body.fault.unwrap();
        assert_eq!(detail.code, "soap:Server");
        assert_eq!(detail.reason, "it broke");
        assert!(envelope.body.operation.is_none());
    }

    #[test]
    fn test_element_to_value() {
        let root = parse_document(
            br#"<person><name>Ann</name><tag>a</tag><tag>b</tag><note/></person>"#,
        )
        .unwrap();
        let value = root.to_value();
        assert_eq!(value["name"], "Ann");
        assert_eq!(value["tag"], serde_json::json!(["a", "b"]));
        assert!(value["note"].is_null());
    }

    #[test]
    fn test_non_soap_root_rejected() {
        let result = parse_soap_envelope(b"<foo/>");
        assert!(matches!(result, Err(SoapHostError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_xxe_detection() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;

        let result = parse_soap_envelope(xxe_payload.as_bytes());
        assert!(matches!(result, Err(SoapHostError::XmlParse(_))));
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(parse_soap_action("\"GetUser\""), "GetUser");
        assert_eq!(parse_soap_action("GetUser"), "GetUser");
        assert_eq!(parse_soap_action("  \"GetUser\"  "), "GetUser");
    }
}
