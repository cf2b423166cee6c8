//! Endpoints and their published servers.

use crate::binding::SoapBinding;
use crate::interceptor::InterceptorChain;
use crate::invoker::{Invoker, ServiceInvoker};
use crate::service::{OperationInfo, ServiceDescriptor, SoapService};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Static description of an endpoint, visible to interceptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Internal address, e.g. `/hello` or `local://hello`
    pub address: String,
    /// Address advertised in the service description, when rewritten
    pub published_url: Option<String>,
    pub binding: SoapBinding,
    pub interface_name: String,
    pub namespace: String,
}

impl EndpointInfo {
    /// The address clients should use.
    pub fn advertised_address(&self) -> &str {
        self.published_url.as_deref().unwrap_or(&self.address)
    }
}

/// Endpoint lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Configured,
    Published,
    Live,
    Shutdown,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::Published => write!(f, "published"),
            Self::Live => write!(f, "live"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// An endpoint being configured. Everything is fixed once it is registered
/// on a bus.
pub struct Endpoint {
    info: EndpointInfo,
    service: Arc<dyn SoapService>,
    descriptor: ServiceDescriptor,
    operations: HashMap<String, Arc<OperationInfo>>,
    invoker: Arc<dyn Invoker>,
    in_interceptors: InterceptorChain,
    in_fault_interceptors: InterceptorChain,
    out_interceptors: InterceptorChain,
    out_fault_interceptors: InterceptorChain,
    properties: HashMap<String, Value>,
}

impl Endpoint {
    /// Describe `service` at `address`. Each interface operation is bound to
    /// the first service method of the same name.
    pub fn new(address: impl Into<String>, service: Arc<dyn SoapService>) -> Self {
        let descriptor = service.descriptor();
        let namespace = descriptor.interface.namespace.clone();

        let mut operations = HashMap::new();
        for operation in &descriptor.interface.operations {
            if let Some(method) = descriptor.find_method(&operation.name) {
                operations.entry(operation.name.clone()).or_insert_with(|| {
                    Arc::new(OperationInfo::for_method(Arc::new(method.clone()), namespace.clone()))
                });
            }
        }

        Self {
            info: EndpointInfo {
                address: address.into(),
                published_url: None,
                binding: SoapBinding::default(),
                interface_name: descriptor.interface.name.clone(),
                namespace,
            },
            invoker: Arc::new(ServiceInvoker::new(service.clone())),
            service,
            descriptor,
            operations,
            in_interceptors: InterceptorChain::new(),
            in_fault_interceptors: InterceptorChain::new(),
            out_interceptors: InterceptorChain::new(),
            out_fault_interceptors: InterceptorChain::new(),
            properties: HashMap::new(),
        }
    }

    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn service(&self) -> &Arc<dyn SoapService> {
        &self.service
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn operation(&self, name: &str) -> Option<&Arc<OperationInfo>> {
        self.operations.get(name)
    }

    /// Operation names, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }

    pub fn set_invoker(&mut self, invoker: Arc<dyn Invoker>) {
        self.invoker = invoker;
    }

    pub fn binding(&self) -> &SoapBinding {
        &self.info.binding
    }

    pub fn binding_mut(&mut self) -> &mut SoapBinding {
        &mut self.info.binding
    }

    pub fn set_published_url(&mut self, url: impl Into<String>) {
        self.info.published_url = Some(url.into());
    }

    pub fn in_interceptors(&self) -> &InterceptorChain {
        &self.in_interceptors
    }

    pub fn in_interceptors_mut(&mut self) -> &mut InterceptorChain {
        &mut self.in_interceptors
    }

    pub fn in_fault_interceptors(&self) -> &InterceptorChain {
        &self.in_fault_interceptors
    }

    pub fn in_fault_interceptors_mut(&mut self) -> &mut InterceptorChain {
        &mut self.in_fault_interceptors
    }

    pub fn out_interceptors(&self) -> &InterceptorChain {
        &self.out_interceptors
    }

    pub fn out_interceptors_mut(&mut self) -> &mut InterceptorChain {
        &mut self.out_interceptors
    }

    pub fn out_fault_interceptors(&self) -> &InterceptorChain {
        &self.out_fault_interceptors
    }

    pub fn out_fault_interceptors_mut(&mut self) -> &mut InterceptorChain {
        &mut self.out_fault_interceptors
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.properties
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("info", &self.info)
            .field("service", &self.descriptor.type_name)
            .field("operations", &self.operation_names())
            .field("in_interceptors", &self.in_interceptors)
            .field("out_interceptors", &self.out_interceptors)
            .finish_non_exhaustive()
    }
}

/// A registered endpoint and its lifecycle state.
#[derive(Debug)]
pub struct Server {
    endpoint: Endpoint,
    info: Arc<EndpointInfo>,
    state: RwLock<EndpointState>,
}

impl Server {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        let info = Arc::new(endpoint.info.clone());
        Self {
            endpoint,
            info,
            state: RwLock::new(EndpointState::Published),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn info(&self) -> &Arc<EndpointInfo> {
        &self.info
    }

    pub fn state(&self) -> EndpointState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: EndpointState) {
        *self.state.write() = state;
    }
}

/// Handle to a published endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    server: Arc<Server>,
}

impl EndpointHandle {
    pub(crate) fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    pub fn address(&self) -> &str {
        &self.server.info.address
    }

    pub fn published_url(&self) -> Option<&str> {
        self.server.info.published_url.as_deref()
    }

    pub fn state(&self) -> EndpointState {
        self.server.state()
    }

    pub fn binding(&self) -> &SoapBinding {
        &self.server.info.binding
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        self.server.endpoint.properties()
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }
}
