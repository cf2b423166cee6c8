//! Phased interceptor chains.

use crate::error::{Fault, SoapHostError};
use crate::message::Exchange;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// Processing phases, inbound phases first. A chain runs its interceptors in
/// phase order; interceptors of the same phase keep insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Receive,
    PreStream,
    ReadHeaders,
    PreProtocol,
    Unmarshal,
    PreLogical,
    PreInvoke,
    Invoke,
    PostInvoke,
    Setup,
    PreMarshal,
    Marshal,
    PostMarshal,
    Write,
    Send,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::PreStream => "pre-stream",
            Self::ReadHeaders => "read-headers",
            Self::PreProtocol => "pre-protocol",
            Self::Unmarshal => "unmarshal",
            Self::PreLogical => "pre-logical",
            Self::PreInvoke => "pre-invoke",
            Self::Invoke => "invoke",
            Self::PostInvoke => "post-invoke",
            Self::Setup => "setup",
            Self::PreMarshal => "pre-marshal",
            Self::Marshal => "marshal",
            Self::PostMarshal => "post-marshal",
            Self::Write => "write",
            Self::Send => "send",
        }
    }

    /// True for phases of an outbound chain.
    pub fn is_outbound(&self) -> bool {
        *self >= Self::Setup
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = SoapHostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Phase; 15] = [
            Phase::Receive,
            Phase::PreStream,
            Phase::ReadHeaders,
            Phase::PreProtocol,
            Phase::Unmarshal,
            Phase::PreLogical,
            Phase::PreInvoke,
            Phase::Invoke,
            Phase::PostInvoke,
            Phase::Setup,
            Phase::PreMarshal,
            Phase::Marshal,
            Phase::PostMarshal,
            Phase::Write,
            Phase::Send,
        ];
        ALL.into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SoapHostError::invalid_argument(format!("unknown phase '{}'", s)))
    }
}

/// A message hook running at a fixed phase.
pub trait Interceptor: Send + Sync {
    fn phase(&self) -> Phase;

    /// Process the exchange. Interceptors answering the request themselves
    /// call [`Exchange::abort`] to stop the chain.
    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered interceptor list.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.phase());
    }

    pub fn extend<I>(&mut self, interceptors: I)
    where
        I: IntoIterator<Item = Arc<dyn Interceptor>>,
    {
        self.interceptors.extend(interceptors);
        self.interceptors.sort_by_key(|i| i.phase());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Interceptor>> {
        self.interceptors.iter()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.interceptors.iter().map(|i| i.phase()).collect()
    }

    /// Run interceptors in order until one faults or aborts the exchange.
    pub fn run(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        for interceptor in &self.interceptors {
            if exchange.is_aborted() {
                break;
            }
            trace!(interceptor = interceptor.name(), phase = %interceptor.phase(), "Running interceptor");
            interceptor.handle_message(exchange)?;
        }
        Ok(())
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| (i.name(), i.phase())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use parking_lot::Mutex;

    struct Recorder {
        phase: Phase,
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        abort: bool,
    }

    impl Interceptor for Recorder {
        fn phase(&self) -> Phase {
            self.phase
        }

        fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
            self.log.lock().push(self.label);
            if self.abort {
                exchange.abort();
            }
            Ok(())
        }
    }

    fn recorder(phase: Phase, label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Interceptor> {
        Arc::new(Recorder {
            phase,
            label,
            log: log.clone(),
            abort: false,
        })
    }

    #[test]
    fn test_chain_runs_in_phase_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.add(recorder(Phase::PreInvoke, "pre-invoke", &log));
        chain.add(recorder(Phase::Unmarshal, "unmarshal-1", &log));
        chain.add(recorder(Phase::Unmarshal, "unmarshal-2", &log));
        chain.add(recorder(Phase::Receive, "receive", &log));

        chain.run(&mut Exchange::new(Message::new())).unwrap();
        assert_eq!(*log.lock(), vec!["receive", "unmarshal-1", "unmarshal-2", "pre-invoke"]);
    }

    #[test]
    fn test_abort_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.add(Arc::new(Recorder {
            phase: Phase::Unmarshal,
            label: "gate",
            log: log.clone(),
            abort: true,
        }));
        chain.add(recorder(Phase::Invoke, "invoke", &log));

        let mut exchange = Exchange::new(Message::new());
        chain.run(&mut exchange).unwrap();
        assert!(exchange.is_aborted());
        assert_eq!(*log.lock(), vec!["gate"]);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!("unmarshal".parse::<Phase>().unwrap(), Phase::Unmarshal);
        assert_eq!("pre-invoke".parse::<Phase>().unwrap(), Phase::PreInvoke);
        assert_eq!("Marshal".parse::<Phase>().unwrap(), Phase::Marshal);
        assert!("nowhere".parse::<Phase>().is_err());
        assert!(Phase::Marshal.is_outbound());
        assert!(!Phase::Invoke.is_outbound());
    }
}
