//! Invoker chain.
//!
//! Every published endpoint dispatches through a fixed stack of decorators
//! assembled at publish time, innermost first:
//!
//! ```text
//! ServiceInvoker -> ValidatingInvoker -> UnitOfWorkInvoker
//!                -> MeteredInvoker -> ExceptionMeteredInvoker -> TimedInvoker
//! ```
//!
//! Each wrapper is transparent for methods it has no metadata for.

mod factory;
mod instrumented;
mod unit_of_work;
mod validating;

pub use factory::{InstrumentedInvokerFactory, UnitOfWorkInvokerFactory};
pub use instrumented::{ExceptionMeteredInvoker, MeteredInvoker, TimedInvoker};
pub use unit_of_work::UnitOfWorkInvoker;
pub use validating::ValidatingInvoker;

use crate::error::InvokeError;
use crate::message::{Arguments, Exchange};
use crate::service::{ServiceContext, ServiceMethod, SoapService, TARGET_METHOD_KEY};
use serde_json::Value;
use std::sync::Arc;

/// Invokes the service method an exchange is dispatched to.
pub trait Invoker: Send + Sync {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError>;
}

/// Resolve the method the exchange's operation is bound to.
pub fn target_method(exchange: &Exchange) -> Result<Arc<ServiceMethod>, InvokeError> {
    exchange
        .operation()
        .and_then(|operation| operation.properties().get_shared(TARGET_METHOD_KEY))
        .and_then(|value| value.clone().downcast::<ServiceMethod>().ok())
        .ok_or(InvokeError::MissingTargetMethod)
}

/// Innermost invoker: calls the service implementation.
pub struct ServiceInvoker {
    service: Arc<dyn SoapService>,
}

impl ServiceInvoker {
    pub fn new(service: Arc<dyn SoapService>) -> Self {
        Self { service }
    }
}

impl Invoker for ServiceInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let method = target_method(exchange)?;
        let context = ServiceContext::new(exchange);
        Ok(self.service.invoke(&context, &method, args)?)
    }
}
