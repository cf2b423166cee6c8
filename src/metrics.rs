//! In-memory metric registry with timers and meters.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Registry of named timers and meters. Lookups are idempotent: asking for
/// the same name twice returns the same metric.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    timers: RwLock<HashMap<String, Arc<Timer>>>,
    meters: RwLock<HashMap<String, Arc<Meter>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dotted metric name, skipping empty parts.
    pub fn name(base: &str, parts: &[&str]) -> String {
        std::iter::once(base)
            .chain(parts.iter().copied())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn timer(&self, name: &str) -> Arc<Timer> {
        if let Some(timer) = self.timers.read().get(name) {
            return timer.clone();
        }
        self.timers
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn meter(&self, name: &str) -> Arc<Meter> {
        if let Some(meter) = self.meters.read().get(name) {
            return meter.clone();
        }
        self.meters
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn get_timer(&self, name: &str) -> Option<Arc<Timer>> {
        self.timers.read().get(name).cloned()
    }

    pub fn get_meter(&self, name: &str) -> Option<Arc<Meter>> {
        self.meters.read().get(name).cloned()
    }

    /// Registered metric names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .timers
            .read()
            .keys()
            .chain(self.meters.read().keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Counts events.
#[derive(Debug, Default)]
pub struct Meter {
    count: AtomicU64,
}

impl Meter {
    pub fn mark(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Records durations.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Timer {
    /// Start timing; the sample is recorded when the context stops or drops.
    pub fn time(self: &Arc<Self>) -> TimerContext {
        TimerContext {
            timer: self.clone(),
            started: Instant::now(),
            stopped: false,
        }
    }

    pub fn update(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = self.count();
        (count > 0).then(|| Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count))
    }
}

/// A running timing sample.
#[derive(Debug)]
pub struct TimerContext {
    timer: Arc<Timer>,
    started: Instant,
    stopped: bool,
}

impl TimerContext {
    /// Record the sample. Only the first call records.
    pub fn stop(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.stopped {
            self.stopped = true;
            self.timer.update(elapsed);
        }
        elapsed
    }
}

impl Drop for TimerContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_skips_empty_parts() {
        assert_eq!(MetricRegistry::name("com.example.Svc", &["foo"]), "com.example.Svc.foo");
        assert_eq!(
            MetricRegistry::name("com.example.Svc", &["foo", "", "exceptions"]),
            "com.example.Svc.foo.exceptions"
        );
        assert_eq!(MetricRegistry::name("", &["absolute"]), "absolute");
    }

    #[test]
    fn test_registry_is_idempotent() {
        let registry = MetricRegistry::new();
        let a = registry.meter("calls");
        let b = registry.meter("calls");
        a.mark();
        assert_eq!(b.count(), 1);
        assert!(Arc::ptr_eq(&registry.timer("t"), &registry.timer("t")));
        assert_eq!(registry.names(), vec!["calls".to_string(), "t".to_string()]);
    }

    #[test]
    fn test_timer_context_records_once() {
        let timer = Arc::new(Timer::default());
        {
            let mut ctx = timer.time();
            ctx.stop();
            ctx.stop();
        }
        assert_eq!(timer.count(), 1);

        drop(timer.time());
        assert_eq!(timer.count(), 2);
        assert!(timer.mean().is_some());
    }
}
