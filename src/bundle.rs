//! Hooks a [`SoapEnvironment`] into a hosting application.

use crate::builder::{ClientBuilder, EndpointBuilder};
use crate::bus::Bus;
use crate::client::ClientProxy;
use crate::config::SoapHostConfig;
use crate::endpoint::EndpointHandle;
use crate::environment::{self, SoapEnvironment};
use crate::error::SoapHostError;
use crate::metrics::MetricRegistry;
use crate::transport::SoapServlet;
use std::sync::Arc;
use tracing::{debug, info};

/// Notified by the host once it accepts requests.
pub trait ServerLifecycleListener: Send + Sync {
    fn server_started(&self);
}

/// The hosting application the bundle registers itself with.
pub trait HostEnvironment {
    fn add_servlet(&mut self, mapping: &str, servlet: SoapServlet);
    fn add_lifecycle_listener(&mut self, listener: Box<dyn ServerLifecycleListener>);
}

/// Servlet registration plus a [`SoapEnvironment`] for publishing endpoints.
pub struct SoapBundle {
    servlet_mapping: String,
    published_endpoint_url_prefix: Option<String>,
    environment: Option<SoapEnvironment>,
}

impl SoapBundle {
    /// `servlet_path` must start with `/`; `/soap` and `/soap/` both map to
    /// `/soap/*`.
    pub fn new(servlet_path: &str) -> Result<Self, SoapHostError> {
        if !servlet_path.starts_with('/') {
            return Err(SoapHostError::invalid_argument(format!(
                "Servlet path must start with '/': {}",
                servlet_path
            )));
        }
        let root = servlet_path.trim_end_matches('*').trim_end_matches('/');
        Ok(Self {
            servlet_mapping: format!("{}/*", root),
            published_endpoint_url_prefix: None,
            environment: None,
        })
    }

    pub fn from_config(config: &SoapHostConfig) -> Result<Self, SoapHostError> {
        config
            .validate()
            .map_err(|e| SoapHostError::Config(e.to_string()))?;
        let mut bundle = Self::new(&config.servlet_path)?;
        bundle.published_endpoint_url_prefix = config.published_endpoint_url_prefix.clone();
        Ok(bundle)
    }

    pub fn servlet_mapping(&self) -> &str {
        &self.servlet_mapping
    }

    /// Create the environment backing this bundle.
    pub fn initialize(&mut self, registry: Arc<MetricRegistry>) -> Result<(), SoapHostError> {
        let mut environment =
            SoapEnvironment::with_metric_registry(&self.servlet_mapping, registry)?;
        if let Some(prefix) = &self.published_endpoint_url_prefix {
            environment.set_published_endpoint_url_prefix(prefix);
        }
        debug!(mapping = %self.servlet_mapping, "SOAP bundle initialized");
        self.environment = Some(environment);
        Ok(())
    }

    /// Register the servlet and a listener that logs endpoints on startup.
    pub fn run(&self, host: &mut dyn HostEnvironment) -> Result<(), SoapHostError> {
        let environment = self.require_environment()?;
        host.add_servlet(&self.servlet_mapping, environment.build_servlet());
        host.add_lifecycle_listener(Box::new(EndpointLogger {
            bus: environment.bus().clone(),
        }));
        info!(mapping = %self.servlet_mapping, "SOAP servlet registered");
        Ok(())
    }

    pub fn environment(&self) -> Option<&SoapEnvironment> {
        self.environment.as_ref()
    }

    pub fn environment_mut(&mut self) -> Option<&mut SoapEnvironment> {
        self.environment.as_mut()
    }

    pub fn publish_endpoint(&self, builder: EndpointBuilder) -> Result<EndpointHandle, SoapHostError> {
        self.require_environment()?.publish_endpoint(builder)
    }

    pub fn get_client(&self, builder: ClientBuilder) -> Result<ClientProxy, SoapHostError> {
        self.require_environment()?.get_client(builder)
    }

    fn require_environment(&self) -> Result<&SoapEnvironment, SoapHostError> {
        self.environment
            .as_ref()
            .ok_or_else(|| SoapHostError::invalid_argument("SOAP bundle is not initialized"))
    }
}

struct EndpointLogger {
    bus: Arc<Bus>,
}

impl ServerLifecycleListener for EndpointLogger {
    fn server_started(&self) {
        environment::server_started(&self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointState;
    use crate::error::ServiceFault;
    use crate::message::Arguments;
    use crate::service::{
        InterfaceOperation, ServiceContext, ServiceDescriptor, ServiceInterface, ServiceMethod,
        SoapService,
    };
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingHost {
        servlets: Vec<(String, SoapServlet)>,
        listeners: Vec<Box<dyn ServerLifecycleListener>>,
    }

    impl HostEnvironment for RecordingHost {
        fn add_servlet(&mut self, mapping: &str, servlet: SoapServlet) {
            self.servlets.push((mapping.to_string(), servlet));
        }

        fn add_lifecycle_listener(&mut self, listener: Box<dyn ServerLifecycleListener>) {
            self.listeners.push(listener);
        }
    }

    struct Ping;

    impl SoapService for Ping {
        fn descriptor(&self) -> ServiceDescriptor {
            ServiceDescriptor::new(
                "com.example.Ping",
                ServiceInterface::new("Ping", "urn:ping").operation(InterfaceOperation::new("ping")),
            )
            .method(ServiceMethod::new("ping"))
        }

        fn invoke(&self, _: &ServiceContext<'_>, _: &ServiceMethod, _: Arguments) -> Result<Value, ServiceFault> {
            Ok(Value::from("pong"))
        }
    }

    #[test]
    fn test_servlet_mapping_normalized() {
        assert_eq!(SoapBundle::new("/soap").unwrap().servlet_mapping(), "/soap/*");
        assert_eq!(SoapBundle::new("/soap/").unwrap().servlet_mapping(), "/soap/*");
        assert_eq!(SoapBundle::new("/soap/*").unwrap().servlet_mapping(), "/soap/*");
    }

    #[test]
    fn test_servlet_path_must_be_absolute() {
        assert!(matches!(
            SoapBundle::new("soap"),
            Err(SoapHostError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_uninitialized_bundle_rejects_calls() {
        let bundle = SoapBundle::new("/soap").unwrap();
        let builder = EndpointBuilder::new("/ping", Arc::new(Ping)).unwrap();
        assert!(bundle.publish_endpoint(builder).is_err());
        assert!(bundle.run(&mut RecordingHost::default()).is_err());
    }

    #[test]
    fn test_run_registers_servlet_and_listener() {
        let mut bundle = SoapBundle::new("/soap").unwrap();
        bundle.initialize(Arc::new(MetricRegistry::new())).unwrap();
        let handle = bundle
            .publish_endpoint(EndpointBuilder::new("/ping", Arc::new(Ping)).unwrap())
            .unwrap();

        let mut host = RecordingHost::default();
        bundle.run(&mut host).unwrap();
        assert_eq!(host.servlets.len(), 1);
        assert_eq!(host.servlets[0].0, "/soap/*");
        assert_eq!(host.servlets[0].1.root(), "/soap");

        assert_eq!(handle.state(), EndpointState::Published);
        for listener in &host.listeners {
            listener.server_started();
        }
        assert_eq!(handle.state(), EndpointState::Live);
    }

    #[test]
    fn test_from_config_applies_prefix() {
        let config = SoapHostConfig {
            servlet_path: "/services".to_string(),
            published_endpoint_url_prefix: Some("https://api.example.com/services".to_string()),
            ..SoapHostConfig::default()
        };
        let mut bundle = SoapBundle::from_config(&config).unwrap();
        bundle.initialize(Arc::new(MetricRegistry::new())).unwrap();

        assert_eq!(bundle.servlet_mapping(), "/services/*");
        let environment = bundle.environment().unwrap();
        assert_eq!(environment.default_path(), "/services");
        assert_eq!(
            environment.published_endpoint_url_prefix(),
            Some("https://api.example.com/services")
        );
    }
}
