use std::{collections::BTreeMap, time::Duration};

use loadcmp_lib::{
    coordinator::RunSummary,
    executor::ExecutorState,
    metrics::{MetricsSnapshot, ScenarioMetrics, TrendSnapshot},
};
use rama::utils::str::arcstr::ArcStr;

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

pub trait Reporter: Send + Sync + 'static {
    fn on_progress(&mut self, progress: &Progress<'_>);
    fn finish(&mut self, summary: &RunSummary);
}

/// Live view on a running comparison.
#[derive(Debug)]
pub struct Progress<'a> {
    pub elapsed: Duration,
    pub states: &'a BTreeMap<ArcStr, ExecutorState>,
    pub snapshots: &'a BTreeMap<ArcStr, MetricsSnapshot>,
}

/// Flattened view on the metrics of one scenario.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioStats {
    pub reqs: u64,
    pub iterations: u64,
    pub fail_rate: f64,
    pub failed: u64,
    pub duration: TrendSnapshot,
    pub workers: u64,
    pub workers_max: u64,
    pub dropped_arrivals: u64,
    pub spawn_failures: u64,
    pub worker_panics: u64,
}

impl ScenarioStats {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let value = |name: &str| {
            snapshot
                .get(name)
                .and_then(|metric| metric.as_value())
                .unwrap_or_default()
        };
        let failed = snapshot
            .get(ScenarioMetrics::REQ_FAILED)
            .and_then(|metric| metric.as_rate().copied())
            .unwrap_or_default();

        Self {
            reqs: value(ScenarioMetrics::REQS),
            iterations: value(ScenarioMetrics::ITERATIONS),
            fail_rate: failed.rate,
            failed: failed.passes,
            duration: snapshot
                .get(ScenarioMetrics::REQ_DURATION)
                .and_then(|metric| metric.as_trend().copied())
                .unwrap_or_default(),
            workers: value(ScenarioMetrics::WORKERS),
            workers_max: value(ScenarioMetrics::WORKERS_MAX),
            dropped_arrivals: value(ScenarioMetrics::DROPPED_ARRIVALS),
            spawn_failures: value(ScenarioMetrics::SPAWN_FAILURES),
            worker_panics: value(ScenarioMetrics::WORKER_PANICS),
        }
    }

    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0. {
            0.
        } else {
            self.reqs as f64 / secs
        }
    }
}

/// Requests per second since the previous progress tick, per scenario.
#[derive(Debug, Default)]
struct IntervalRps {
    last_elapsed: Duration,
    last_reqs: BTreeMap<ArcStr, u64>,
}

impl IntervalRps {
    fn update(&mut self, progress: &Progress<'_>) -> BTreeMap<ArcStr, f64> {
        let interval = progress
            .elapsed
            .saturating_sub(self.last_elapsed)
            .as_secs_f64();
        self.last_elapsed = progress.elapsed;

        progress
            .snapshots
            .iter()
            .map(|(name, snapshot)| {
                let reqs = ScenarioStats::from_snapshot(snapshot).reqs;
                let last = self.last_reqs.insert(name.clone(), reqs).unwrap_or_default();
                let rps = if interval == 0. {
                    0.
                } else {
                    reqs.saturating_sub(last) as f64 / interval
                };
                (name.clone(), rps)
            })
            .collect()
    }
}
