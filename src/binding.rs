//! Protocol binding: SOAP version, binding identifiers and MTOM mode.

use serde::{Deserialize, Serialize};

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP 1.1 over HTTP binding identifier (default).
pub const SOAP_11_HTTP_BINDING: &str = "http://schemas.xmlsoap.org/wsdl/soap/http";
/// SOAP 1.2 over HTTP binding identifier.
pub const SOAP_12_HTTP_BINDING: &str = "http://www.w3.org/2003/05/soap/bindings/HTTP/";
/// WSDL namespace form of the SOAP 1.1 binding.
pub const SOAP_11_BINDING: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
/// WSDL namespace form of the SOAP 1.2 binding.
pub const SOAP_12_BINDING: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Content type of a plain (non-MTOM) envelope.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    /// Media type advertised as the root part type of an MTOM package.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }
}

/// Binding of an endpoint or a client proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapBinding {
    binding_id: String,
    version: SoapVersion,
    mtom_enabled: bool,
}

impl SoapBinding {
    /// Create a binding from an identifier. Both the HTTP binding form and the
    /// WSDL namespace form are accepted; the HTTP form is what gets reported.
    pub fn new(binding_id: &str) -> Self {
        let (binding_id, version) = match binding_id.trim() {
            SOAP_12_HTTP_BINDING | SOAP_12_BINDING => (SOAP_12_HTTP_BINDING, SoapVersion::Soap12),
            SOAP_11_HTTP_BINDING | SOAP_11_BINDING | "" => (SOAP_11_HTTP_BINDING, SoapVersion::Soap11),
            other => (other, SoapVersion::Soap11),
        };
        Self {
            binding_id: binding_id.to_string(),
            version,
            mtom_enabled: false,
        }
    }

    pub fn binding_id(&self) -> &str {
        &self.binding_id
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn is_mtom_enabled(&self) -> bool {
        self.mtom_enabled
    }

    pub fn set_mtom_enabled(&mut self, enabled: bool) {
        self.mtom_enabled = enabled;
    }
}

impl Default for SoapBinding {
    fn default() -> Self {
        Self::new(SOAP_11_HTTP_BINDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binding() {
        let binding = SoapBinding::default();
        assert_eq!(binding.binding_id(), SOAP_11_HTTP_BINDING);
        assert_eq!(binding.version(), SoapVersion::Soap11);
        assert!(!binding.is_mtom_enabled());
    }

    #[test]
    fn test_soap12_wsdl_namespace_maps_to_http_binding() {
        let binding = SoapBinding::new(SOAP_12_BINDING);
        assert_eq!(binding.binding_id(), "http://www.w3.org/2003/05/soap/bindings/HTTP/");
        assert_eq!(binding.version(), SoapVersion::Soap12);
    }

    #[test]
    fn test_version_namespaces() {
        assert_eq!(SoapVersion::from_namespace(SOAP_11_NS), Some(SoapVersion::Soap11));
        assert_eq!(SoapVersion::from_namespace(SOAP_12_NS), Some(SoapVersion::Soap12));
        assert_eq!(SoapVersion::from_namespace("urn:other"), None);
    }
}
