use super::{ExceptionMeteredInvoker, Invoker, MeteredInvoker, TimedInvoker, UnitOfWorkInvoker};
use crate::metrics::MetricRegistry;
use crate::scanner::MethodMetadata;
use crate::session::SessionFactory;
use std::collections::HashMap;
use std::sync::Arc;

/// Wraps an invoker with the metric wrappers a service's metadata asks for.
#[derive(Debug, Clone)]
pub struct InstrumentedInvokerFactory {
    registry: Arc<MetricRegistry>,
}

impl InstrumentedInvokerFactory {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Meter, exception meter and timer, innermost first. Kinds with no
    /// annotated method are left out.
    pub fn create(&self, metadata: &MethodMetadata, invoker: Arc<dyn Invoker>) -> Arc<dyn Invoker> {
        let mut invoker = invoker;

        if !metadata.meters.is_empty() {
            let meters = metadata
                .meters
                .iter()
                .map(|(method, spec)| (method.clone(), self.registry.meter(&spec.name)))
                .collect();
            invoker = Arc::new(MeteredInvoker::new(invoker, meters));
        }

        if !metadata.exception_meters.is_empty() {
            let meters: HashMap<_, _> = metadata
                .exception_meters
                .iter()
                .map(|(method, spec)| {
                    let filter = spec.cause.clone().unwrap_or_default();
                    (method.clone(), (self.registry.meter(&spec.name), filter))
                })
                .collect();
            invoker = Arc::new(ExceptionMeteredInvoker::new(invoker, meters));
        }

        if !metadata.timers.is_empty() {
            let timers = metadata
                .timers
                .iter()
                .map(|(method, spec)| (method.clone(), self.registry.timer(&spec.name)))
                .collect();
            invoker = Arc::new(TimedInvoker::new(invoker, timers));
        }

        invoker
    }
}

/// Wraps an invoker with a unit-of-work wrapper when any method asks for one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitOfWorkInvokerFactory;

impl UnitOfWorkInvokerFactory {
    pub fn create(
        &self,
        metadata: &MethodMetadata,
        invoker: Arc<dyn Invoker>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Arc<dyn Invoker> {
        if metadata.units_of_work.is_empty() {
            return invoker;
        }
        Arc::new(UnitOfWorkInvoker::new(
            invoker,
            metadata.units_of_work.clone(),
            session_factory,
        ))
    }
}
