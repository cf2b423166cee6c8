//! Endpoint and client builders.

use crate::auth::{BasicAuthentication, BasicCredentials};
use crate::binding::SOAP_11_HTTP_BINDING;
use crate::client::Handler;
use crate::config::ClientDefaults;
use crate::error::SoapHostError;
use crate::interceptor::Interceptor;
use crate::service::{ServiceInterface, SoapService};
use crate::session::SessionFactory;
use crate::transport::LOCAL_TRANSPORT_PREFIX;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration of an endpoint to publish.
#[derive(Clone)]
pub struct EndpointBuilder {
    path: String,
    service: Arc<dyn SoapService>,
    authentication: Option<BasicAuthentication>,
    session_factory: Option<Arc<dyn SessionFactory>>,
    in_interceptors: Vec<Arc<dyn Interceptor>>,
    in_fault_interceptors: Vec<Arc<dyn Interceptor>>,
    out_interceptors: Vec<Arc<dyn Interceptor>>,
    out_fault_interceptors: Vec<Arc<dyn Interceptor>>,
    mtom_enabled: bool,
    published_endpoint_url: Option<String>,
    properties: Option<HashMap<String, Value>>,
}

impl EndpointBuilder {
    /// Publish `service` at `path`. Paths get a leading `/` unless they
    /// address the local transport.
    pub fn new(path: &str, service: Arc<dyn SoapService>) -> Result<Self, SoapHostError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(SoapHostError::invalid_argument("Path is empty"));
        }
        let path = if path.starts_with('/') || path.starts_with(LOCAL_TRANSPORT_PREFIX) {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Ok(Self {
            path,
            service,
            authentication: None,
            session_factory: None,
            in_interceptors: Vec::new(),
            in_fault_interceptors: Vec::new(),
            out_interceptors: Vec::new(),
            out_fault_interceptors: Vec::new(),
            mtom_enabled: false,
            published_endpoint_url: None,
            properties: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn service(&self) -> &Arc<dyn SoapService> {
        &self.service
    }

    pub fn authentication(mut self, authentication: BasicAuthentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    pub fn session_factory(mut self, session_factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = Some(session_factory);
        self
    }

    pub fn in_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.in_interceptors = interceptors;
        self
    }

    pub fn in_fault_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.in_fault_interceptors = interceptors;
        self
    }

    pub fn out_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.out_interceptors = interceptors;
        self
    }

    pub fn out_fault_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.out_fault_interceptors = interceptors;
        self
    }

    pub fn enable_mtom(mut self) -> Self {
        self.mtom_enabled = true;
        self
    }

    /// Address advertised in the service description instead of the
    /// internal one.
    pub fn published_endpoint_url(mut self, url: &str) -> Result<Self, SoapHostError> {
        if url.trim().is_empty() {
            return Err(SoapHostError::invalid_argument("Published endpoint URL is empty"));
        }
        self.published_endpoint_url = Some(url.trim().to_string());
        Ok(self)
    }

    pub fn properties(mut self, properties: HashMap<String, Value>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn get_authentication(&self) -> Option<&BasicAuthentication> {
        self.authentication.as_ref()
    }

    pub fn get_session_factory(&self) -> Option<&Arc<dyn SessionFactory>> {
        self.session_factory.as_ref()
    }

    pub fn get_in_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.in_interceptors
    }

    pub fn get_in_fault_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.in_fault_interceptors
    }

    pub fn get_out_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.out_interceptors
    }

    pub fn get_out_fault_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.out_fault_interceptors
    }

    pub fn is_mtom_enabled(&self) -> bool {
        self.mtom_enabled
    }

    pub fn get_published_endpoint_url(&self) -> Option<&str> {
        self.published_endpoint_url.as_deref()
    }

    pub fn get_properties(&self) -> Option<&HashMap<String, Value>> {
        self.properties.as_ref()
    }
}

impl fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("path", &self.path)
            .field("service", &self.service.descriptor().type_name)
            .field("authentication", &self.authentication)
            .field("mtom_enabled", &self.mtom_enabled)
            .field("published_endpoint_url", &self.published_endpoint_url)
            .finish_non_exhaustive()
    }
}

/// Configuration of a client proxy.
#[derive(Clone)]
pub struct ClientBuilder {
    interface: ServiceInterface,
    address: String,
    connect_timeout: Duration,
    receive_timeout: Duration,
    handlers: Vec<Arc<dyn Handler>>,
    binding_id: Option<String>,
    in_interceptors: Vec<Arc<dyn Interceptor>>,
    in_fault_interceptors: Vec<Arc<dyn Interceptor>>,
    out_interceptors: Vec<Arc<dyn Interceptor>>,
    out_fault_interceptors: Vec<Arc<dyn Interceptor>>,
    mtom_enabled: bool,
    credentials: Option<BasicCredentials>,
}

impl ClientBuilder {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
    pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);

    pub fn new(interface: ServiceInterface, address: &str) -> Result<Self, SoapHostError> {
        if address.trim().is_empty() {
            return Err(SoapHostError::invalid_argument("Address is empty"));
        }
        Ok(Self {
            interface,
            address: address.trim().to_string(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: Self::DEFAULT_RECEIVE_TIMEOUT,
            handlers: Vec::new(),
            binding_id: None,
            in_interceptors: Vec::new(),
            in_fault_interceptors: Vec::new(),
            out_interceptors: Vec::new(),
            out_fault_interceptors: Vec::new(),
            mtom_enabled: false,
            credentials: None,
        })
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Apply configured timeout defaults.
    pub fn with_defaults(self, defaults: &ClientDefaults) -> Self {
        self.connect_timeout(Duration::from_millis(defaults.connect_timeout_ms))
            .receive_timeout(Duration::from_millis(defaults.receive_timeout_ms))
    }

    pub fn handlers(mut self, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn binding_id(mut self, binding_id: &str) -> Result<Self, SoapHostError> {
        if binding_id.trim().is_empty() {
            return Err(SoapHostError::invalid_argument("Binding id is empty"));
        }
        self.binding_id = Some(binding_id.trim().to_string());
        Ok(self)
    }

    pub fn in_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.in_interceptors = interceptors;
        self
    }

    pub fn in_fault_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.in_fault_interceptors = interceptors;
        self
    }

    pub fn out_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.out_interceptors = interceptors;
        self
    }

    pub fn out_fault_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.out_fault_interceptors = interceptors;
        self
    }

    pub fn enable_mtom(mut self) -> Self {
        self.mtom_enabled = true;
        self
    }

    /// Send HTTP Basic credentials with every request.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(BasicCredentials::new(username, password));
        self
    }

    pub fn get_interface(&self) -> &ServiceInterface {
        &self.interface
    }

    pub fn get_address(&self) -> &str {
        &self.address
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn get_handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    pub fn get_binding_id(&self) -> &str {
        self.binding_id.as_deref().unwrap_or(SOAP_11_HTTP_BINDING)
    }

    pub fn get_in_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.in_interceptors
    }

    pub fn get_in_fault_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.in_fault_interceptors
    }

    pub fn get_out_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.out_interceptors
    }

    pub fn get_out_fault_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.out_fault_interceptors
    }

    pub fn is_mtom_enabled(&self) -> bool {
        self.mtom_enabled
    }

    pub fn get_credentials(&self) -> Option<&BasicCredentials> {
        self.credentials.as_ref()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("interface", &self.interface.name)
            .field("address", &self.address)
            .field("connect_timeout", &self.connect_timeout)
            .field("receive_timeout", &self.receive_timeout)
            .field("binding_id", &self.get_binding_id())
            .field("mtom_enabled", &self.mtom_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceFault;
    use crate::message::Arguments;
    use crate::service::{ServiceContext, ServiceDescriptor, ServiceMethod};

    struct Nothing;

    impl SoapService for Nothing {
        fn descriptor(&self) -> ServiceDescriptor {
            ServiceDescriptor::new("Nothing", ServiceInterface::new("Nothing", "urn:nothing"))
        }

        fn invoke(&self, _: &ServiceContext<'_>, _: &ServiceMethod, _: Arguments) -> Result<Value, ServiceFault> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_endpoint_path_validation() {
        assert!(EndpointBuilder::new("", Arc::new(Nothing)).is_err());
        assert!(EndpointBuilder::new("   ", Arc::new(Nothing)).is_err());
        assert_eq!(EndpointBuilder::new("foo", Arc::new(Nothing)).unwrap().path(), "/foo");
        assert_eq!(EndpointBuilder::new("/foo", Arc::new(Nothing)).unwrap().path(), "/foo");
        assert_eq!(
            EndpointBuilder::new("local://foo", Arc::new(Nothing)).unwrap().path(),
            "local://foo"
        );
    }

    #[test]
    fn test_endpoint_defaults() {
        let builder = EndpointBuilder::new("/foo", Arc::new(Nothing)).unwrap();
        assert!(builder.get_authentication().is_none());
        assert!(builder.get_session_factory().is_none());
        assert!(builder.get_in_interceptors().is_empty());
        assert!(!builder.is_mtom_enabled());
        assert!(builder.get_published_endpoint_url().is_none());
        assert!(builder.get_properties().is_none());
        assert!(builder.published_endpoint_url(" ").is_err());
    }

    #[test]
    fn test_client_defaults() {
        let builder = ClientBuilder::new(ServiceInterface::new("Svc", "urn:svc"), "http://host/svc").unwrap();
        assert_eq!(builder.get_connect_timeout(), Duration::from_millis(500));
        assert_eq!(builder.get_receive_timeout(), Duration::from_millis(2000));
        assert!(builder.get_handlers().is_empty());
        assert_eq!(builder.get_binding_id(), SOAP_11_HTTP_BINDING);
        assert!(!builder.is_mtom_enabled());
    }

    #[test]
    fn test_client_address_validation() {
        assert!(ClientBuilder::new(ServiceInterface::new("Svc", "urn:svc"), "").is_err());
        assert!(ClientBuilder::new(ServiceInterface::new("Svc", "urn:svc"), " \t").is_err());
    }

    #[test]
    fn test_client_with_config_defaults() {
        let defaults = ClientDefaults {
            connect_timeout_ms: 10,
            receive_timeout_ms: 20,
        };
        let builder = ClientBuilder::new(ServiceInterface::new("Svc", "urn:svc"), "http://host/svc")
            .unwrap()
            .with_defaults(&defaults);
        assert_eq!(builder.get_connect_timeout(), Duration::from_millis(10));
        assert_eq!(builder.get_receive_timeout(), Duration::from_millis(20));
    }
}
