use rama::{error::BoxError, telemetry::tracing};

use super::{Counter, Gauge, MetricRegistry, MetricsSnapshot, Rate, Trend};
use crate::scenario::RequestOutcome;

/// Handles to the standard metric set of a single scenario.
///
/// Cloning is cheap, all clones share the same series.
#[derive(Debug, Clone)]
pub struct ScenarioMetrics {
    registry: MetricRegistry,
    pub req_duration: Trend,
    pub req_failed: Rate,
    pub reqs: Counter,
    pub iterations: Counter,
    pub dropped_arrivals: Counter,
    pub spawn_failures: Counter,
    pub worker_panics: Counter,
    pub workers: Gauge,
    pub workers_max: Gauge,
}

impl ScenarioMetrics {
    pub const REQ_DURATION: &'static str = "req_duration";
    pub const REQ_FAILED: &'static str = "req_failed";
    pub const REQS: &'static str = "reqs";
    pub const ITERATIONS: &'static str = "iterations";
    pub const DROPPED_ARRIVALS: &'static str = "dropped_arrivals";
    pub const SPAWN_FAILURES: &'static str = "spawn_failures";
    pub const WORKER_PANICS: &'static str = "worker_panics";
    pub const WORKERS: &'static str = "workers";
    pub const WORKERS_MAX: &'static str = "workers_max";

    pub fn try_new(registry: MetricRegistry) -> Result<Self, BoxError> {
        Ok(Self {
            req_duration: registry.trend(Self::REQ_DURATION)?,
            req_failed: registry.rate(Self::REQ_FAILED)?,
            reqs: registry.counter(Self::REQS)?,
            iterations: registry.counter(Self::ITERATIONS)?,
            dropped_arrivals: registry.counter(Self::DROPPED_ARRIVALS)?,
            spawn_failures: registry.counter(Self::SPAWN_FAILURES)?,
            worker_panics: registry.counter(Self::WORKER_PANICS)?,
            workers: registry.gauge(Self::WORKERS)?,
            workers_max: registry.gauge(Self::WORKERS_MAX)?,
            registry,
        })
    }

    /// Record the outcome of one completed request.
    ///
    /// Contains no suspension point: a worker cancelled at an await
    /// either recorded the whole outcome or nothing of it.
    pub fn record(&self, outcome: &RequestOutcome) {
        if let Err(err) = self.req_duration.add(outcome.duration_ms()) {
            tracing::warn!("discard request duration sample: {err}");
        }
        self.req_failed.add(!outcome.is_success());
        self.reqs.add(1);
    }

    pub fn set_workers(&self, live: usize) {
        self.workers.set(live as u64);
        self.workers_max.set_max(live as u64);
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}
