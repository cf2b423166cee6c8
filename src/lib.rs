//! SOAP web-service hosting for Zentinel
//!
//! Publishes SOAP endpoints and builds SOAP client proxies. Every published
//! endpoint dispatches through a chain of invoker wrappers assembled from
//! per-method metadata:
//!
//! - Timers, meters and exception meters recorded in a [`MetricRegistry`]
//! - Unit-of-work sessions with transaction begin/commit/rollback
//! - Argument validation through a pluggable [`Validator`]
//! - HTTP Basic authentication with 401/403 challenges
//! - Global or per-endpoint published URLs, MTOM and SOAP 1.2 bindings
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zentinel_soap_host::{ClientBuilder, EndpointBuilder, SoapEnvironment};
//!
//! let env = SoapEnvironment::new("/soap/*")?;
//! env.publish_endpoint(EndpointBuilder::new("local://hello", Arc::new(HelloService))?)?;
//!
//! let client = env.get_client(ClientBuilder::new(HelloService::interface(), "local://hello")?)?;
//! let greeting = client.invoke("sayHello", vec!["World".into()]).await?;
//! ```

pub mod auth;
pub mod binding;
pub mod builder;
pub mod bundle;
pub mod bus;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod interceptor;
pub mod invoker;
pub mod message;
pub mod metrics;
pub mod mtom;
pub mod parser;
pub mod scanner;
pub mod service;
pub mod session;
pub mod transport;
pub mod validation;
pub mod writer;
pub mod wsdl;

pub use auth::{
    Authenticator, BasicAuthentication, BasicAuthenticationInterceptor, BasicCredentials,
    PRINCIPAL_KEY,
};
pub use binding::{SoapBinding, SoapVersion, SOAP_11_HTTP_BINDING, SOAP_12_HTTP_BINDING};
pub use builder::{ClientBuilder, EndpointBuilder};
pub use bundle::{HostEnvironment, ServerLifecycleListener, SoapBundle};
pub use bus::Bus;
pub use client::{ClientInterceptors, ClientProxy, Handler, MessageContext};
pub use config::{ClientDefaults, ConfigError, SoapHostConfig};
pub use endpoint::{Endpoint, EndpointHandle, EndpointInfo, EndpointState, Server};
pub use environment::SoapEnvironment;
pub use error::{
    AuthenticationError, ClientError, Fault, FaultCode, InvokeError, ServiceFault, SessionError,
    SoapHostError,
};
pub use interceptor::{Interceptor, InterceptorChain, Phase};
pub use invoker::Invoker;
pub use message::{Arguments, Exchange, FaultMode, Message};
pub use metrics::{Meter, MetricRegistry, Timer};
pub use service::{
    ExceptionFilter, ExceptionMetered, InterfaceOperation, Metered, Parameter, ServiceContext,
    ServiceDescriptor, ServiceInterface, ServiceMethod, SoapService, Timed,
};
pub use session::{CacheMode, FlushMode, ManagedSessionContext, Session, SessionFactory, UnitOfWork};
pub use transport::{HttpClientPolicy, SoapServlet, LOCAL_TRANSPORT_PREFIX};
pub use validation::{Constraint, ConstraintValidator, Validator};
