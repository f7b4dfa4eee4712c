use std::time::Duration;

use rama::{rt::Executor, telemetry::tracing, utils::str::arcstr::ArcStr};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};

use super::{
    ExecutorCore, ExecutorReport, ExecutorSettings, ExecutorState, ScenarioExecutor, StopSignal,
};
use crate::{
    metrics::ScenarioMetrics,
    scenario::{Scenario, Workload},
    schedule::RampingSchedule,
};

/// Closed-loop executor: keeps the live worker count on the ramp.
#[derive(Debug)]
pub struct RampingExecutor<W> {
    core: ExecutorCore<W>,
    schedule: RampingSchedule,
}

impl<W: Workload> RampingExecutor<W> {
    pub fn new(
        scenario: Scenario<W>,
        schedule: RampingSchedule,
        metrics: ScenarioMetrics,
        exec: Executor,
        settings: ExecutorSettings,
    ) -> Self {
        let mut core = ExecutorCore::new(&scenario, metrics, exec, settings);
        if let Some(limit) = core.settings.worker_limit {
            core.pool = core.pool.with_limit(limit);
        }
        Self { core, schedule }
    }

    fn resize(&mut self, target: usize, report: &mut ExecutorReport) {
        if let Err(err) = self.core.pool.resize(target) {
            report.spawn_failures += 1;
            self.core.metrics.spawn_failures.add(1);
            tracing::warn!(
                scenario = %self.core.scenario,
                target,
                live = self.core.pool.live(),
                "failed to grow worker pool: {err}",
            );
        }
    }
}

impl<W: Workload> ScenarioExecutor for RampingExecutor<W> {
    fn scenario(&self) -> &ArcStr {
        &self.core.scenario
    }

    fn subscribe(&self) -> watch::Receiver<ExecutorState> {
        self.core.state.subscribe()
    }

    async fn run(mut self, mut stop: StopSignal) -> ExecutorReport {
        let mut report = ExecutorReport::new(self.core.scenario.clone(), "ramping");
        let start = Instant::now();

        tracing::info!(
            scenario = %self.core.scenario,
            start_workers = self.schedule.start_workers,
            stages = self.schedule.stages.len(),
            duration = ?self.schedule.total_duration(),
            "ramping scenario started",
        );
        self.core.transition(ExecutorState::Running);
        self.resize(self.schedule.start_workers, &mut report);

        let stage_ends: Vec<_> = self.schedule.stage_ends().collect();
        let mut next_stage = 0;
        // time spent draining for zero-target stages does not count
        // towards the schedule
        let mut paused = Duration::ZERO;

        let mut ticker =
            tokio::time::interval(self.core.settings.tick.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'run: loop {
            tokio::select! {
                biased;

                _ = stop.stopped() => {
                    tracing::info!(scenario = %self.core.scenario, "stop requested: drain workers");
                    report.stopped_early = true;
                    break 'run;
                }
                _ = ticker.tick() => (),
            }

            let elapsed = start.elapsed().saturating_sub(paused);
            while let Some(&stage_end) = stage_ends.get(next_stage)
                && elapsed >= stage_end
            {
                let target = self.schedule.stages[next_stage].target;
                self.resize(target, &mut report);

                if target == 0 && next_stage + 1 < stage_ends.len() {
                    let drain_start = Instant::now();
                    let drained = tokio::select! {
                        biased;

                        _ = stop.stopped() => {
                            tracing::info!(
                                scenario = %self.core.scenario,
                                stage = next_stage,
                                "stop requested during zero-target stage: drain workers",
                            );
                            report.stopped_early = true;
                            break 'run;
                        }
                        drained = self.core.pool.wait_terminated(self.core.settings.drain_timeout) => drained,
                    };
                    paused += drain_start.elapsed();
                    tracing::debug!(
                        scenario = %self.core.scenario,
                        stage = next_stage,
                        exited = drained.exited,
                        cancelled = drained.cancelled,
                        "zero-target stage drained",
                    );
                }

                let live = self.core.pool.live();
                tracing::debug!(
                    scenario = %self.core.scenario,
                    stage = next_stage,
                    target,
                    live,
                    "stage boundary reached",
                );
                report.stage_workers.push(live);
                next_stage += 1;
            }

            if next_stage >= stage_ends.len() {
                break 'run;
            }

            let elapsed = start.elapsed().saturating_sub(paused);
            self.resize(self.schedule.desired_concurrency(elapsed), &mut report);
        }

        self.core.drain(&mut report).await;
        report.elapsed = start.elapsed();
        report
    }
}
