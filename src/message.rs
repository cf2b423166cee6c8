//! Messages and exchanges flowing through interceptor chains and invokers.
//!
//! An [`Exchange`] is owned by the worker handling one request for its whole
//! lifetime, so nothing in here is synchronized.

use crate::endpoint::EndpointInfo;
use crate::error::InvokeError;
use crate::parser::{SoapEnvelope, UsernameToken};
use crate::service::OperationInfo;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased attribute value.
pub type AttributeValue = Arc<dyn Any + Send + Sync>;

/// String-keyed attribute map with typed accessors.
#[derive(Clone, Default)]
pub struct Attributes {
    entries: HashMap<String, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    pub fn insert_shared(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.entries.insert(key.into(), value);
    }

    /// Typed lookup; `None` when absent or stored with another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    pub fn get_shared(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_set().entries(keys).finish()
    }
}

/// How a fault raised while invoking should be treated by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Expected application fault; logged without a stack of causes.
    CheckedApplicationFault,
    /// Unexpected application fault.
    UncheckedApplicationFault,
    /// Fault raised by the runtime itself.
    RuntimeFault,
}

/// Credentials supplied by the transport (HTTP Basic authorization).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub authorization_type: Option<String>,
}

/// Security token extracted from the SOAP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityToken {
    UsernameToken(UsernameToken),
}

/// Operation arguments as delivered by the unmarshalling step.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Arguments {
    #[default]
    Empty,
    /// A single unwrapped value.
    Scalar(Value),
    List(Vec<Value>),
}

impl Arguments {
    /// Parameter list view; a scalar is a singleton list.
    pub fn params(&self) -> Vec<&Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::Scalar(value) => vec![value],
            Self::List(values) => values.iter().collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.params().get(index).copied()
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Scalar(_) => 1,
            Self::List(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        if values.is_empty() {
            Self::Empty
        } else {
            Self::List(values)
        }
    }
}

/// An inbound or outbound message.
#[derive(Debug, Default)]
pub struct Message {
    headers: HeaderMap,
    content: Vec<u8>,
    response_code: Option<StatusCode>,
    fault_mode: Option<FaultMode>,
    authorization_policy: Option<AuthorizationPolicy>,
    security_token: Option<SecurityToken>,
    attributes: Attributes,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(headers: HeaderMap, content: Vec<u8>) -> Self {
        Self {
            headers,
            content,
            ..Default::default()
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, ignoring values that are not valid header text.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    pub fn take_content(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.content)
    }

    pub fn response_code(&self) -> Option<StatusCode> {
        self.response_code
    }

    pub fn set_response_code(&mut self, code: StatusCode) {
        self.response_code = Some(code);
    }

    pub fn fault_mode(&self) -> Option<FaultMode> {
        self.fault_mode
    }

    pub fn set_fault_mode(&mut self, mode: FaultMode) {
        self.fault_mode = Some(mode);
    }

    pub fn authorization_policy(&self) -> Option<&AuthorizationPolicy> {
        self.authorization_policy.as_ref()
    }

    pub fn set_authorization_policy(&mut self, policy: AuthorizationPolicy) {
        self.authorization_policy = Some(policy);
    }

    pub fn security_token(&self) -> Option<&SecurityToken> {
        self.security_token.as_ref()
    }

    pub fn set_security_token(&mut self, token: SecurityToken) {
        self.security_token = Some(token);
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

/// Per-request state shared by interceptors and invokers.
#[derive(Debug, Default)]
pub struct Exchange {
    in_message: Message,
    out_message: Option<Message>,
    endpoint: Option<Arc<EndpointInfo>>,
    operation: Option<Arc<OperationInfo>>,
    envelope: Option<SoapEnvelope>,
    arguments: Option<Arguments>,
    result: Option<Value>,
    fault: Option<InvokeError>,
    aborted: bool,
    committed: Option<http::Response<Vec<u8>>>,
}

impl Exchange {
    pub fn new(in_message: Message) -> Self {
        Self {
            in_message,
            ..Default::default()
        }
    }

    pub fn for_endpoint(in_message: Message, endpoint: Arc<EndpointInfo>) -> Self {
        Self {
            in_message,
            endpoint: Some(endpoint),
            ..Default::default()
        }
    }

    pub fn in_message(&self) -> &Message {
        &self.in_message
    }

    pub fn in_message_mut(&mut self) -> &mut Message {
        &mut self.in_message
    }

    pub fn out_message(&self) -> Option<&Message> {
        self.out_message.as_ref()
    }

    /// Outbound message, created on first use.
    pub fn out_message_mut(&mut self) -> &mut Message {
        self.out_message.get_or_insert_with(Message::new)
    }

    pub fn endpoint(&self) -> Option<&Arc<EndpointInfo>> {
        self.endpoint.as_ref()
    }

    /// Operation descriptor of the call being dispatched.
    pub fn operation(&self) -> Option<&Arc<OperationInfo>> {
        self.operation.as_ref()
    }

    pub fn set_operation(&mut self, operation: Arc<OperationInfo>) {
        self.operation = Some(operation);
    }

    pub fn envelope(&self) -> Option<&SoapEnvelope> {
        self.envelope.as_ref()
    }

    pub fn set_envelope(&mut self, envelope: SoapEnvelope) {
        self.envelope = Some(envelope);
    }

    pub fn set_arguments(&mut self, arguments: Arguments) {
        self.arguments = Some(arguments);
    }

    pub fn take_arguments(&mut self) -> Arguments {
        self.arguments.take().unwrap_or_default()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    pub fn fault(&self) -> Option<&InvokeError> {
        self.fault.as_ref()
    }

    pub fn set_fault(&mut self, fault: InvokeError) {
        self.fault = Some(fault);
    }

    pub fn take_fault(&mut self) -> Option<InvokeError> {
        self.fault.take()
    }

    /// Stop the interceptor chain after the current interceptor.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Write the outbound message straight to the transport back-channel.
    ///
    /// Used by interceptors that answer a request themselves; the response is
    /// committed as-is and the regular outbound chain is skipped.
    pub fn send_back_channel(&mut self) {
        let out = self.out_message.take().unwrap_or_default();
        let mut response = http::Response::new(out.content);
        *response.status_mut() = out.response_code.unwrap_or(StatusCode::OK);
        *response.headers_mut() = out.headers;
        self.committed = Some(response);
    }

    pub fn committed(&self) -> Option<&http::Response<Vec<u8>>> {
        self.committed.as_ref()
    }

    pub fn take_committed(&mut self) -> Option<http::Response<Vec<u8>>> {
        self.committed.take()
    }
}
