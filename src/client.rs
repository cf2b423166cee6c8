//! Client proxies for remote SOAP services.

use crate::auth::{basic_authorization, BasicCredentials};
use crate::binding::SoapBinding;
use crate::error::ClientError;
use crate::interceptor::InterceptorChain;
use crate::message::{Exchange, Message};
use crate::mtom;
use crate::parser::{parse_soap_envelope, XmlElement};
use crate::service::ServiceInterface;
use crate::transport::{Conduit, HttpClientPolicy};
use crate::writer;
use http::{header, HeaderMap, Request};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Message state visible to a handler.
#[derive(Debug)]
pub struct MessageContext {
    outbound: bool,
    operation: String,
    headers: HeaderMap,
    content: Vec<u8>,
}

impl MessageContext {
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }
}

/// A client-side message handler. Handlers see requests in registration
/// order and responses in reverse order.
pub trait Handler: Send + Sync {
    /// Return `false` to stop processing the message.
    fn handle_message(&self, context: &mut MessageContext) -> bool;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Interceptor chains of a client proxy.
#[derive(Debug, Clone, Default)]
pub struct ClientInterceptors {
    pub in_interceptors: InterceptorChain,
    pub in_fault_interceptors: InterceptorChain,
    pub out_interceptors: InterceptorChain,
    pub out_fault_interceptors: InterceptorChain,
}

/// A proxy for a remote service interface.
pub struct ClientProxy {
    interface: ServiceInterface,
    address: String,
    policy: HttpClientPolicy,
    binding: SoapBinding,
    handlers: Vec<Arc<dyn Handler>>,
    interceptors: ClientInterceptors,
    credentials: Option<BasicCredentials>,
    conduit: Arc<dyn Conduit>,
}

impl ClientProxy {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        interface: ServiceInterface,
        address: String,
        policy: HttpClientPolicy,
        binding: SoapBinding,
        handlers: Vec<Arc<dyn Handler>>,
        interceptors: ClientInterceptors,
        credentials: Option<BasicCredentials>,
        conduit: Arc<dyn Conduit>,
    ) -> Self {
        Self {
            interface,
            address,
            policy,
            binding,
            handlers,
            interceptors,
            credentials,
            conduit,
        }
    }

    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn http_client_policy(&self) -> &HttpClientPolicy {
        &self.policy
    }

    pub fn binding(&self) -> &SoapBinding {
        &self.binding
    }

    pub fn handler_chain(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    pub fn interceptors(&self) -> &ClientInterceptors {
        &self.interceptors
    }

    /// Call `operation` with positional arguments.
    pub async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let op = self.interface.find_operation(operation).ok_or_else(|| ClientError::UnknownOperation {
            interface: self.interface.name.clone(),
            operation: operation.to_string(),
        })?;

        let mut content = String::new();
        for (index, arg) in args.iter().enumerate() {
            writer::write_value(&op.parameter_name(index), arg, &mut content);
        }
        let body = writer::operation_element(&op.name, &self.interface.namespace, &content);
        let version = self.binding.version();
        let envelope = writer::envelope(version, None, &body);

        debug!(address = %self.address, operation = %operation, "Calling remote operation");

        let mut exchange = Exchange::new(Message::new());
        {
            let out = exchange.out_message_mut();
            out.set_header(header::CONTENT_TYPE, version.content_type());
            out.set_header(
                http::HeaderName::from_static("soapaction"),
                &format!("\"{}\"", op.name),
            );
            out.set_content(envelope.into_bytes());
        }
        self.interceptors
            .out_interceptors
            .run(&mut exchange)
            .map_err(|fault| ClientError::Interceptor(fault.message))?;
        if exchange.is_aborted() {
            return Err(ClientError::Interceptor("outbound chain aborted".to_string()));
        }

        let out = exchange.out_message_mut();
        let mut context = MessageContext {
            outbound: true,
            operation: op.name.clone(),
            headers: std::mem::take(out.headers_mut()),
            content: out.take_content(),
        };
        for handler in &self.handlers {
            if !handler.handle_message(&mut context) {
                return Err(ClientError::HandlerAborted(handler.name().to_string()));
            }
        }

        let mut content = context.content;
        let mut headers = context.headers;
        if self.binding.is_mtom_enabled() {
            let (content_type, wrapped) = mtom::wrap(&content, version);
            content = wrapped;
            if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                headers.insert(header::CONTENT_TYPE, value);
            }
        }
        if let Some(credentials) = &self.credentials {
            let authorization = basic_authorization(&credentials.username, &credentials.password);
            if let Ok(value) = header::HeaderValue::from_str(&authorization) {
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        let mut request = Request::post(self.request_uri())
            .body(content)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        *request.headers_mut() = headers;

        let response = self.conduit.send(request).await?;
        let status = response.status();
        let (parts, body) = response.into_parts();

        let body = match parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            Some(content_type) if mtom::is_multipart(content_type) => mtom::unwrap(content_type, &body)
                .ok_or_else(|| ClientError::Transport("malformed multipart response".to_string()))?,
            _ => body,
        };

        let mut context = MessageContext {
            outbound: false,
            operation: op.name.clone(),
            headers: parts.headers,
            content: body,
        };
        for handler in self.handlers.iter().rev() {
            if !handler.handle_message(&mut context) {
                return Err(ClientError::HandlerAborted(handler.name().to_string()));
            }
        }

        if context.content.is_empty() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let mut exchange = Exchange::new(Message::with_content(context.headers, context.content));
        let envelope = parse_soap_envelope(exchange.in_message().content())?;
        exchange.set_envelope(envelope);

        let is_fault = exchange.envelope().is_some_and(|e| e.body.fault.is_some());
        let chain = if is_fault {
            &self.interceptors.in_fault_interceptors
        } else {
            &self.interceptors.in_interceptors
        };
        chain
            .run(&mut exchange)
            .map_err(|fault| ClientError::Interceptor(fault.message))?;

        let Some(envelope) = exchange.envelope() else {
            return Err(ClientError::Transport("response envelope missing".to_string()));
        };
        if let Some(fault) = &envelope.body.fault {
            return Err(ClientError::Fault {
                code: fault.code.clone(),
                reason: fault.reason.clone(),
            });
        }
        Ok(return_value(&envelope.body.parameters))
    }

    fn request_uri(&self) -> String {
        if self.address.starts_with(crate::transport::LOCAL_TRANSPORT_PREFIX) {
            "/".to_string()
        } else {
            self.address.clone()
        }
    }
}

fn return_value(parameters: &[XmlElement]) -> Value {
    let mut values: Vec<Value> = parameters
        .iter()
        .filter(|p| p.local_name == "return")
        .map(XmlElement::to_value)
        .collect();
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

impl fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("interface", &self.interface.name)
            .field("address", &self.address)
            .field("policy", &self.policy)
            .field("binding", &self.binding)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SoapVersion;
    use crate::error::{soap_fault_response, FaultCode};
    use crate::service::InterfaceOperation;
    use async_trait::async_trait;
    use http::Response;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records the request and answers with a canned body.
    struct CannedConduit {
        response: Vec<u8>,
        content_type: String,
        seen: Mutex<Option<Request<Vec<u8>>>>,
    }

    impl CannedConduit {
        fn new(response: String) -> Arc<Self> {
            Arc::new(Self {
                response: response.into_bytes(),
                content_type: "text/xml".into(),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Conduit for CannedConduit {
        async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ClientError> {
            *self.seen.lock() = Some(request);
            let mut response = Response::new(self.response.clone());
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, self.content_type.parse().unwrap());
            Ok(response)
        }
    }

    struct Tagger;

    impl Handler for Tagger {
        fn handle_message(&self, context: &mut MessageContext) -> bool {
            if context.is_outbound() {
                context
                    .headers_mut()
                    .insert("x-tagged", header::HeaderValue::from_static("yes"));
            }
            true
        }
    }

    struct Blocker;

    impl Handler for Blocker {
        fn handle_message(&self, _: &mut MessageContext) -> bool {
            false
        }
    }

    fn interface() -> ServiceInterface {
        ServiceInterface::new("Greeter", "urn:greeter")
            .operation(InterfaceOperation::new("greet").parameter("name"))
    }

    fn proxy(conduit: Arc<dyn Conduit>, handlers: Vec<Arc<dyn Handler>>) -> ClientProxy {
        ClientProxy::new(
            interface(),
            "http://localhost/greeter".into(),
            HttpClientPolicy::default(),
            SoapBinding::default(),
            handlers,
            ClientInterceptors::default(),
            Some(BasicCredentials::new("alice", "secret")),
            conduit,
        )
    }

    fn response(body: &str) -> String {
        writer::envelope(
            SoapVersion::Soap11,
            None,
            &writer::operation_element("greetResponse", "urn:greeter", body),
        )
    }

    #[tokio::test]
    async fn test_invoke_returns_value() {
        let conduit = CannedConduit::new(response("<return>Hello Ann</return>"));
        let proxy = proxy(conduit.clone(), vec![Arc::new(Tagger)]);

        let value = proxy.invoke("greet", vec![json!("Ann")]).await.unwrap();
        assert_eq!(value, json!("Hello Ann"));

        let request = conduit.seen.lock().take().unwrap();
        assert_eq!(request.uri(), "http://localhost/greeter");
        assert_eq!(request.headers()["x-tagged"], "yes");
        assert!(request.headers()[header::AUTHORIZATION]
            .to_str()
            .unwrap()
            .starts_with("Basic "));
        let sent = String::from_utf8(request.into_body()).unwrap();
        assert!(sent.contains("<name>Ann</name>"));
    }

    #[tokio::test]
    async fn test_fault_response() {
        let conduit = CannedConduit::new(soap_fault_response(FaultCode::Server, "boom", SoapVersion::Soap11));
        let err = proxy(conduit, Vec::new()).invoke("greet", Vec::new()).await.unwrap_err();
        match err {
            ClientError::Fault { code, reason } => {
                assert_eq!(code, "soap:Server");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let conduit = CannedConduit::new(response(""));
        let err = proxy(conduit, Vec::new()).invoke("wave", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn test_handler_can_stop_request() {
        let conduit = CannedConduit::new(response(""));
        let err = proxy(conduit.clone(), vec![Arc::new(Blocker)])
            .invoke("greet", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::HandlerAborted(_)));
        assert!(conduit.seen.lock().is_none());
    }

    #[test]
    fn test_multiple_returns_become_array() {
        let parameters = vec![
            XmlElement {
                local_name: "return".into(),
                text: "a".into(),
                ..Default::default()
            },
            XmlElement {
                local_name: "return".into(),
                text: "b".into(),
                ..Default::default()
            },
        ];
        assert_eq!(return_value(&parameters), json!(["a", "b"]));
        assert_eq!(return_value(&[]), Value::Null);
    }
}
