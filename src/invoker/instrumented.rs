use super::{target_method, Invoker};
use crate::error::InvokeError;
use crate::message::{Arguments, Exchange};
use crate::metrics::{Meter, Timer};
use crate::service::ExceptionFilter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Records one timing sample per call of a timed method.
pub struct TimedInvoker {
    underlying: Arc<dyn Invoker>,
    timers: HashMap<String, Arc<Timer>>,
}

impl TimedInvoker {
    pub fn new(underlying: Arc<dyn Invoker>, timers: HashMap<String, Arc<Timer>>) -> Self {
        Self { underlying, timers }
    }
}

impl Invoker for TimedInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let method = target_method(exchange)?;
        match self.timers.get(&method.name) {
            Some(timer) => {
                let _context = timer.time();
                self.underlying.invoke(exchange, args)
            }
            None => self.underlying.invoke(exchange, args),
        }
    }
}

/// Marks a meter on entry to a metered method.
pub struct MeteredInvoker {
    underlying: Arc<dyn Invoker>,
    meters: HashMap<String, Arc<Meter>>,
}

impl MeteredInvoker {
    pub fn new(underlying: Arc<dyn Invoker>, meters: HashMap<String, Arc<Meter>>) -> Self {
        Self { underlying, meters }
    }
}

impl Invoker for MeteredInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let method = target_method(exchange)?;
        if let Some(meter) = self.meters.get(&method.name) {
            meter.mark();
        }
        self.underlying.invoke(exchange, args)
    }
}

/// Marks a meter when a method fails with a matching error.
pub struct ExceptionMeteredInvoker {
    underlying: Arc<dyn Invoker>,
    meters: HashMap<String, (Arc<Meter>, ExceptionFilter)>,
}

impl ExceptionMeteredInvoker {
    pub fn new(
        underlying: Arc<dyn Invoker>,
        meters: HashMap<String, (Arc<Meter>, ExceptionFilter)>,
    ) -> Self {
        Self { underlying, meters }
    }
}

impl Invoker for ExceptionMeteredInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let method = target_method(exchange)?;
        let result = self.underlying.invoke(exchange, args);
        if let (Err(err), Some((meter, filter))) = (&result, self.meters.get(&method.name)) {
            if filter.matches(err) {
                meter.mark();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{exchange_for, CountingInvoker, RequestedFailure};
    use super::*;
    use crate::service::ServiceMethod;

    fn fail() -> Arguments {
        Arguments::Scalar(Value::String("fail".into()))
    }

    #[test]
    fn test_timer_records_on_success_and_failure() {
        let underlying = Arc::new(CountingInvoker::default());
        let timer = Arc::new(Timer::default());
        let invoker = TimedInvoker::new(
            underlying.clone(),
            HashMap::from([("timed".to_string(), timer.clone())]),
        );
        let mut exchange = exchange_for(ServiceMethod::new("timed"));

        invoker.invoke(&mut exchange, Arguments::Empty).unwrap();
        invoker.invoke(&mut exchange, fail()).unwrap_err();

        assert_eq!(timer.count(), 2);
        assert_eq!(underlying.calls(), 2);
    }

    #[test]
    fn test_meter_marks_on_entry() {
        let meter = Arc::new(Meter::default());
        let invoker = MeteredInvoker::new(
            Arc::new(CountingInvoker::default()),
            HashMap::from([("metered".to_string(), meter.clone())]),
        );
        let mut exchange = exchange_for(ServiceMethod::new("metered"));

        invoker.invoke(&mut exchange, Arguments::Empty).unwrap();
        invoker.invoke(&mut exchange, fail()).unwrap_err();
        assert_eq!(meter.count(), 2);
    }

    #[test]
    fn test_exception_meter_filters_errors() {
        let any = Arc::new(Meter::default());
        let io_only = Arc::new(Meter::default());
        let invoker = ExceptionMeteredInvoker::new(
            Arc::new(CountingInvoker::default()),
            HashMap::from([
                ("any".to_string(), (any.clone(), ExceptionFilter::any())),
                ("io".to_string(), (io_only.clone(), ExceptionFilter::of::<std::io::Error>())),
            ]),
        );

        let mut exchange = exchange_for(ServiceMethod::new("any"));
        invoker.invoke(&mut exchange, Arguments::Empty).unwrap();
        let err = invoker.invoke(&mut exchange, fail()).unwrap_err();
        assert!(err.thrown().is::<RequestedFailure>());
        assert_eq!(any.count(), 1);

        let mut exchange = exchange_for(ServiceMethod::new("io"));
        invoker.invoke(&mut exchange, fail()).unwrap_err();
        assert_eq!(io_only.count(), 0);
    }

    #[test]
    fn test_wrappers_are_transparent_for_unlisted_methods() {
        let meter = Arc::new(Meter::default());
        let timer = Arc::new(Timer::default());
        let underlying = Arc::new(CountingInvoker::default());
        let metered = Arc::new(MeteredInvoker::new(
            underlying.clone(),
            HashMap::from([("other".to_string(), meter.clone())]),
        ));
        let invoker = TimedInvoker::new(metered, HashMap::from([("other".to_string(), timer.clone())]));
        let mut exchange = exchange_for(ServiceMethod::new("plain"));

        assert_eq!(invoker.invoke(&mut exchange, Arguments::Empty).unwrap(), Value::String("ok".into()));
        let err = invoker.invoke(&mut exchange, fail()).unwrap_err();
        assert!(err.thrown().is::<RequestedFailure>());
        assert_eq!(meter.count(), 0);
        assert_eq!(timer.count(), 0);
        assert_eq!(underlying.calls(), 2);
    }
}
