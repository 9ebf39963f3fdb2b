//! Instrumentation client injected into the renderer.
//!
//! The renderer never looks up a global metrics namespace; it receives an
//! [`Instrumentation`] implementation at construction time and reports
//! counters and timer marks through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::lock::mutex_lock;

pub const METRIC_RENDER_EVENTS: &str = "isorender_events_total";
pub const METRIC_RENDER_STAGE_MS: &str = "isorender_stage_ms";

const SOURCE: &str = "instrument";

pub trait Instrumentation: Send + Sync {
    /// Count one occurrence of a named render event (`count`, `cacheHit`, `abort`, ...).
    fn increment(&self, event: &'static str);

    /// Record the time spent reaching a named pipeline mark.
    fn record_mark(&self, mark: &'static str, elapsed: Duration);
}

/// Elapsed timer that reports the time between consecutive marks.
pub struct Timer {
    instrumentation: Arc<dyn Instrumentation>,
    last: Instant,
}

impl Timer {
    pub fn start(instrumentation: Arc<dyn Instrumentation>) -> Self {
        Self {
            instrumentation,
            last: Instant::now(),
        }
    }

    pub fn mark(&mut self, mark: &'static str) {
        let now = Instant::now();
        self.instrumentation
            .record_mark(mark, now.duration_since(self.last));
        self.last = now;
    }
}

/// Forwards to the process-wide `metrics` recorder installed by the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsInstrumentation;

impl Instrumentation for MetricsInstrumentation {
    fn increment(&self, event: &'static str) {
        counter!(METRIC_RENDER_EVENTS, "event" => event).increment(1);
    }

    fn record_mark(&self, mark: &'static str, elapsed: Duration) {
        histogram!(METRIC_RENDER_STAGE_MS, "mark" => mark).record(elapsed.as_secs_f64() * 1000.0);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn increment(&self, _event: &'static str) {}

    fn record_mark(&self, _mark: &'static str, _elapsed: Duration) {}
}

/// In-process tallies, for embedding hosts that scrape their own counters.
#[derive(Debug, Default)]
pub struct MemoryInstrumentation {
    counters: Mutex<HashMap<&'static str, u64>>,
    marks: Mutex<HashMap<&'static str, u64>>,
}

impl MemoryInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event: &str) -> u64 {
        mutex_lock(&self.counters, SOURCE, "count")
            .get(event)
            .copied()
            .unwrap_or(0)
    }

    /// Number of times the named timer mark was reached.
    pub fn marks(&self, mark: &str) -> u64 {
        mutex_lock(&self.marks, SOURCE, "marks")
            .get(mark)
            .copied()
            .unwrap_or(0)
    }
}

impl Instrumentation for MemoryInstrumentation {
    fn increment(&self, event: &'static str) {
        *mutex_lock(&self.counters, SOURCE, "increment")
            .entry(event)
            .or_default() += 1;
    }

    fn record_mark(&self, mark: &'static str, _elapsed: Duration) {
        *mutex_lock(&self.marks, SOURCE, "record_mark")
            .entry(mark)
            .or_default() += 1;
    }
}
