//! Publishes endpoints and builds clients against one bus.

use crate::auth::BasicAuthenticationInterceptor;
use crate::builder::{ClientBuilder, EndpointBuilder};
use crate::bus::Bus;
use crate::binding::SoapBinding;
use crate::client::{ClientInterceptors, ClientProxy};
use crate::endpoint::{Endpoint, EndpointHandle, EndpointState};
use crate::error::SoapHostError;
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::invoker::{
    InstrumentedInvokerFactory, Invoker, ServiceInvoker, UnitOfWorkInvokerFactory,
    ValidatingInvoker,
};
use crate::metrics::MetricRegistry;
use crate::scanner::MethodMetadata;
use crate::transport::{
    Conduit, HttpClientPolicy, HttpConduit, LocalConduit, SoapServlet, LOCAL_TRANSPORT_PREFIX,
};
use crate::validation::{ConstraintValidator, Validator};
use std::sync::Arc;
use tracing::{debug, info};

/// Assembles invoker chains, publishes endpoints and creates client proxies.
///
/// Environments are independent: each owns its own bus, so two environments
/// may publish the same address.
pub struct SoapEnvironment {
    default_path: String,
    bus: Arc<Bus>,
    instrumented_invoker_factory: InstrumentedInvokerFactory,
    unit_of_work_invoker_factory: UnitOfWorkInvokerFactory,
    validator: Arc<dyn Validator>,
    published_endpoint_url_prefix: Option<String>,
}

impl SoapEnvironment {
    /// `default_path` is the servlet mapping, e.g. `/soap/*`; it must start
    /// with `/`.
    pub fn new(default_path: &str) -> Result<Self, SoapHostError> {
        Self::with_metric_registry(default_path, Arc::new(MetricRegistry::new()))
    }

    pub fn with_metric_registry(
        default_path: &str,
        registry: Arc<MetricRegistry>,
    ) -> Result<Self, SoapHostError> {
        if !default_path.starts_with('/') {
            return Err(SoapHostError::invalid_argument(format!(
                "Servlet path must start with '/': {}",
                default_path
            )));
        }
        Ok(Self {
            default_path: default_path.trim_end_matches("/*").to_string(),
            bus: Arc::new(Bus::new()),
            instrumented_invoker_factory: InstrumentedInvokerFactory::new(registry),
            unit_of_work_invoker_factory: UnitOfWorkInvokerFactory,
            validator: Arc::new(ConstraintValidator::new()),
            published_endpoint_url_prefix: None,
        })
    }

    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn metric_registry(&self) -> &Arc<MetricRegistry> {
        self.instrumented_invoker_factory.registry()
    }

    pub fn set_instrumented_invoker_factory(&mut self, factory: InstrumentedInvokerFactory) {
        self.instrumented_invoker_factory = factory;
    }

    pub fn set_unit_of_work_invoker_factory(&mut self, factory: UnitOfWorkInvokerFactory) {
        self.unit_of_work_invoker_factory = factory;
    }

    pub fn set_validator(&mut self, validator: Arc<dyn Validator>) {
        self.validator = validator;
    }

    pub fn set_published_endpoint_url_prefix(&mut self, prefix: &str) {
        let prefix = prefix.trim().trim_end_matches('/');
        self.published_endpoint_url_prefix = (!prefix.is_empty()).then(|| prefix.to_string());
    }

    pub fn published_endpoint_url_prefix(&self) -> Option<&str> {
        self.published_endpoint_url_prefix.as_deref()
    }

    /// Servlet serving this environment's endpoints under the default path.
    pub fn build_servlet(&self) -> SoapServlet {
        SoapServlet::new(self.bus.clone(), self.default_path.clone())
    }

    /// Publish an endpoint with its invoker chain and interceptors.
    pub fn publish_endpoint(&self, builder: EndpointBuilder) -> Result<EndpointHandle, SoapHostError> {
        let mut endpoint = Endpoint::new(builder.path(), builder.service().clone());
        let type_name = endpoint.descriptor().type_name.clone();

        if let Some(url) = self.published_url(&builder) {
            endpoint.set_published_url(url);
        }
        if builder.is_mtom_enabled() {
            endpoint.binding_mut().set_mtom_enabled(true);
        }

        let invoker = self.create_invoker(&builder, endpoint.descriptor());
        endpoint.set_invoker(invoker);

        if let Some(authentication) = builder.get_authentication() {
            endpoint
                .in_interceptors_mut()
                .add(Arc::new(BasicAuthenticationInterceptor::new(authentication.clone())));
        }
        endpoint
            .in_interceptors_mut()
            .extend(builder.get_in_interceptors().iter().cloned());
        endpoint
            .in_fault_interceptors_mut()
            .extend(builder.get_in_fault_interceptors().iter().cloned());
        endpoint
            .out_interceptors_mut()
            .extend(builder.get_out_interceptors().iter().cloned());
        endpoint
            .out_fault_interceptors_mut()
            .extend(builder.get_out_fault_interceptors().iter().cloned());

        if let Some(properties) = builder.get_properties() {
            endpoint.properties_mut().extend(properties.clone());
        }

        self.bus.register(endpoint)?;
        let server = self.bus.find_server(builder.path(), &type_name).ok_or_else(|| {
            SoapHostError::EndpointPublishFailed(format!(
                "no server for {} at {}",
                type_name,
                builder.path()
            ))
        })?;

        info!(
            address = %builder.path(),
            service = %type_name,
            published_url = ?server.info().published_url,
            "Published SOAP endpoint"
        );
        Ok(EndpointHandle::new(server))
    }

    /// Timer → exception meter → meter → unit of work → validating → service.
    ///
    /// Commit and rollback run inside the metric wrappers.
    fn create_invoker(
        &self,
        builder: &EndpointBuilder,
        descriptor: &crate::service::ServiceDescriptor,
    ) -> Arc<dyn Invoker> {
        let metadata = MethodMetadata::scan(descriptor);
        let service: Arc<dyn Invoker> = Arc::new(ServiceInvoker::new(builder.service().clone()));

        let mut invoker: Arc<dyn Invoker> =
            Arc::new(ValidatingInvoker::new(service, self.validator.clone()));
        if let Some(session_factory) = builder.get_session_factory() {
            invoker = self
                .unit_of_work_invoker_factory
                .create(&metadata, invoker, session_factory.clone());
        }
        self.instrumented_invoker_factory.create(&metadata, invoker)
    }

    fn published_url(&self, builder: &EndpointBuilder) -> Option<String> {
        if let Some(url) = builder.get_published_endpoint_url() {
            return Some(url.to_string());
        }
        let prefix = self.published_endpoint_url_prefix.as_deref()?;
        if builder.path().starts_with(LOCAL_TRANSPORT_PREFIX) {
            return None;
        }
        Some(format!("{}{}", prefix, builder.path()))
    }

    /// Build a client proxy.
    pub fn get_client(&self, builder: ClientBuilder) -> Result<ClientProxy, SoapHostError> {
        let policy = HttpClientPolicy {
            connect_timeout: builder.get_connect_timeout(),
            receive_timeout: builder.get_receive_timeout(),
        };

        let mut binding = SoapBinding::new(builder.get_binding_id());
        if builder.is_mtom_enabled() {
            binding.set_mtom_enabled(true);
        }

        let conduit: Arc<dyn Conduit> = if builder.get_address().starts_with(LOCAL_TRANSPORT_PREFIX) {
            Arc::new(LocalConduit::new(self.bus.clone(), builder.get_address(), &policy))
        } else {
            Arc::new(HttpConduit::new(&policy).map_err(|e| {
                SoapHostError::invalid_argument(format!("Unable to create HTTP client: {}", e))
            })?)
        };

        let interceptors = ClientInterceptors {
            in_interceptors: chain(builder.get_in_interceptors()),
            in_fault_interceptors: chain(builder.get_in_fault_interceptors()),
            out_interceptors: chain(builder.get_out_interceptors()),
            out_fault_interceptors: chain(builder.get_out_fault_interceptors()),
        };

        debug!(
            address = %builder.get_address(),
            interface = %builder.get_interface().name,
            binding = %binding.binding_id(),
            "Created SOAP client"
        );
        Ok(ClientProxy::new(
            builder.get_interface().clone(),
            builder.get_address().to_string(),
            policy,
            binding,
            builder.get_handlers().to_vec(),
            interceptors,
            builder.get_credentials().cloned(),
            conduit,
        ))
    }

    /// Log published endpoints.
    pub fn log_endpoints(&self) {
        log_endpoints(&self.bus);
    }

    /// Mark published endpoints live.
    pub fn server_started(&self) {
        server_started(&self.bus);
    }

    /// Shut down every endpoint; later requests get 503.
    pub fn shutdown(&self) {
        let mut stopped = self.bus.transition(EndpointState::Live, EndpointState::Shutdown);
        stopped.extend(
            self.bus
                .transition(EndpointState::Published, EndpointState::Shutdown),
        );
        info!(count = stopped.len(), "SOAP endpoints shut down");
    }
}

pub(crate) fn server_started(bus: &Bus) {
    bus.transition(EndpointState::Published, EndpointState::Live);
    log_endpoints(bus);
}

pub(crate) fn log_endpoints(bus: &Bus) {
    let servers = bus.servers();
    if servers.is_empty() {
        info!("No SOAP endpoints were published");
        return;
    }

    let mut listing = String::from("SOAP endpoints:\n");
    for server in servers {
        listing.push_str(&format!(
            "\n    {} ({}) [{}]",
            server.info().advertised_address(),
            server.endpoint().descriptor().type_name,
            server.state()
        ));
    }
    info!("{}\n", listing);
}

fn chain(interceptors: &[Arc<dyn Interceptor>]) -> InterceptorChain {
    let mut chain = InterceptorChain::new();
    chain.extend(interceptors.iter().cloned());
    chain
}
