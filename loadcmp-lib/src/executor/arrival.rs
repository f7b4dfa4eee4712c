use rama::{rt::Executor, telemetry::tracing, utils::str::arcstr::ArcStr};
use tokio::{sync::watch, time::Instant};

use super::{
    ExecutorCore, ExecutorReport, ExecutorSettings, ExecutorState, ScenarioExecutor, StopSignal,
    pacer::ArrivalPacer,
};
use crate::{
    metrics::ScenarioMetrics,
    pool::Arrival,
    scenario::{Scenario, Workload},
    schedule::ArrivalRateSchedule,
};

/// Open-model executor: starts iterations at a fixed rate,
/// independent of how fast the target responds.
#[derive(Debug)]
pub struct ConstantArrivalExecutor<W> {
    core: ExecutorCore<W>,
    schedule: ArrivalRateSchedule,
}

impl<W: Workload> ConstantArrivalExecutor<W> {
    pub fn new(
        scenario: Scenario<W>,
        schedule: ArrivalRateSchedule,
        metrics: ScenarioMetrics,
        exec: Executor,
        settings: ExecutorSettings,
    ) -> Self {
        let mut core = ExecutorCore::new(&scenario, metrics, exec, settings);
        core.pool = core.pool.with_limit(schedule.max_workers);
        Self { core, schedule }
    }
}

impl<W: Workload> ScenarioExecutor for ConstantArrivalExecutor<W> {
    fn scenario(&self) -> &ArcStr {
        &self.core.scenario
    }

    fn subscribe(&self) -> watch::Receiver<ExecutorState> {
        self.core.state.subscribe()
    }

    async fn run(mut self, mut stop: StopSignal) -> ExecutorReport {
        let mut report = ExecutorReport::new(self.core.scenario.clone(), "constant-arrival-rate");
        let interval = self.schedule.next_arrival_delay();

        tracing::info!(
            scenario = %self.core.scenario,
            rate = self.schedule.rate,
            time_unit = ?self.schedule.time_unit,
            ?interval,
            pre_allocated_workers = self.schedule.pre_allocated_workers,
            max_workers = self.schedule.max_workers,
            duration = ?self.schedule.duration,
            "constant arrival rate scenario started",
        );
        self.core.transition(ExecutorState::Running);
        if let Err(err) = self.core.pool.prefill(self.schedule.pre_allocated_workers) {
            report.spawn_failures += 1;
            self.core.metrics.spawn_failures.add(1);
            tracing::warn!(scenario = %self.core.scenario, "failed to pre-allocate workers: {err}");
        }

        let start = Instant::now();
        let deadline = tokio::time::sleep_until(start + self.schedule.duration);
        let mut deadline = std::pin::pin!(deadline);
        let mut pacer = ArrivalPacer::new(interval, self.core.settings.arrival_jitter);

        loop {
            tokio::select! {
                biased;

                _ = stop.stopped() => {
                    tracing::info!(scenario = %self.core.scenario, "stop requested: drain workers");
                    report.stopped_early = true;
                    break;
                }
                _ = deadline.as_mut() => {
                    tracing::debug!(scenario = %self.core.scenario, "scenario duration elapsed");
                    break;
                }
                _ = pacer.wait_one() => (),
            }

            report.arrivals += 1;
            match self.core.pool.acquire_for_arrival() {
                Arrival::Dispatched(worker) | Arrival::Spawned(worker) => {
                    tracing::trace!(scenario = %self.core.scenario, worker, "arrival dispatched");
                }
                Arrival::Dropped => {
                    report.dropped_arrivals += 1;
                    self.core.metrics.dropped_arrivals.add(1);
                    tracing::debug!(
                        scenario = %self.core.scenario,
                        max_workers = self.schedule.max_workers,
                        "no worker available: arrival dropped",
                    );
                }
            }
        }

        self.core.drain(&mut report).await;
        report.elapsed = start.elapsed();
        report
    }
}
