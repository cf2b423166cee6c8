//! Error types for the SOAP host.

use crate::binding::SoapVersion;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Errors raised while configuring or publishing endpoints and clients.
#[derive(Error, Debug)]
pub enum SoapHostError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Error publishing endpoint: {0}")]
    EndpointPublishFailed(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapHostError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Errors crossing the invoker chain.
///
/// Wrappers return these unchanged; a service error keeps its concrete type
/// inside [`ServiceFault`] so callers and exception meters can downcast it.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Target method not found on operation info")]
    MissingTargetMethod,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Fault(#[from] ServiceFault),
}

impl InvokeError {
    /// The error the exception meters look at: the service error for faults,
    /// the invoke error itself otherwise.
    pub fn thrown(&self) -> &(dyn StdError + 'static) {
        match self {
            Self::Fault(fault) => fault.inner(),
            other => other,
        }
    }

    /// Fault code reported to the SOAP client.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            Self::InvalidArgument(_) => FaultCode::Client,
            _ => FaultCode::Server,
        }
    }
}

/// An error produced by a service method.
pub struct ServiceFault {
    inner: Box<dyn StdError + Send + Sync + 'static>,
}

impl ServiceFault {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(error),
        }
    }

    /// Fault carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: message.into().into(),
        }
    }

    pub fn inner(&self) -> &(dyn StdError + 'static) {
        self.inner.as_ref()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.inner
    }
}

impl fmt::Debug for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for ServiceFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Errors reported by a session provider.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unable to open session: {0}")]
    Open(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Raised by a credential validator when the credentials cannot be checked
/// or are rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Authentication failed: {0}")]
pub struct AuthenticationError(pub String);

impl AuthenticationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Raised by an interceptor to stop a chain with a SOAP fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Fault {
    pub code: FaultCode,
    pub message: String,
}

impl Fault {
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Client,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Server,
            message: message.into(),
        }
    }
}

/// Errors returned by client proxies.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unknown operation '{operation}' on {interface}")]
    UnknownOperation { interface: String, operation: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("SOAP fault [{code}]: {reason}")]
    Fault { code: String, reason: String },

    #[error("HTTP status {status} without SOAP response")]
    Http { status: u16 },

    #[error("Message processing stopped by handler '{0}'")]
    HandlerAborted(String),

    #[error("Interceptor fault: {0}")]
    Interceptor(String),

    #[error(transparent)]
    Envelope(#[from] SoapHostError),
}

/// SOAP fault code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The sender's message was at fault.
    Client,
    /// The service failed while processing a valid message.
    Server,
}

impl FaultCode {
    fn soap_11(&self) -> &'static str {
        match self {
            Self::Client => "soap:Client",
            Self::Server => "soap:Server",
        }
    }

    fn soap_12(&self) -> &'static str {
        match self {
            Self::Client => "soap:Sender",
            Self::Server => "soap:Receiver",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("Client"),
            Self::Server => f.write_str("Server"),
        }
    }
}

/// Generate a SOAP Fault envelope.
pub fn soap_fault_response(code: FaultCode, reason: &str, version: SoapVersion) -> String {
    match version {
        SoapVersion::Soap11 => soap_11_fault(code, reason),
        SoapVersion::Soap12 => soap_12_fault(code, reason),
    }
}

fn soap_11_fault(code: FaultCode, reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        code.soap_11(),
        xml_escape(reason.trim())
    )
}

fn soap_12_fault(code: FaultCode, reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        code.soap_12(),
        xml_escape(reason.trim())
    )
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("no such person: {0}")]
    struct NoSuchPerson(u32);

    #[test]
    fn test_service_fault_keeps_concrete_type() {
        let fault = ServiceFault::new(NoSuchPerson(7));
        assert!(fault.is::<NoSuchPerson>());
        assert_eq!(fault.downcast_ref::<NoSuchPerson>().unwrap().0, 7);
        assert_eq!(fault.to_string(), "no such person: 7");

        let err = InvokeError::from(fault);
        assert!(err.thrown().is::<NoSuchPerson>());
    }

    #[test]
    fn test_thrown_is_self_for_non_faults() {
        let err = InvokeError::MissingTargetMethod;
        assert!(err.thrown().is::<InvokeError>());
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(InvokeError::InvalidArgument("x".into()).fault_code(), FaultCode::Client);
        assert_eq!(InvokeError::MissingTargetMethod.fault_code(), FaultCode::Server);
    }

    #[test]
    fn test_soap_11_fault() {
        let fault = soap_fault_response(FaultCode::Client, "bad <input>", SoapVersion::Soap11);
        assert!(fault.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(fault.contains("<faultcode>soap:Client</faultcode>"));
        assert!(fault.contains("bad &lt;input&gt;"));
    }

    #[test]
    fn test_soap_12_fault() {
        let fault = soap_fault_response(FaultCode::Server, "boom", SoapVersion::Soap12);
        assert!(fault.contains("http://www.w3.org/2003/05/soap-envelope"));
        assert!(fault.contains("soap:Receiver"));
    }
}
