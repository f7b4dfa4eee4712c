//! Runs a set of scenarios side by side, each under its own executor.

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use rama::{
    error::{BoxError, ErrorContext as _, ErrorExt as _},
    rt::Executor,
    telemetry::tracing,
    utils::str::arcstr::ArcStr,
};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

use crate::{
    executor::{
        AnyExecutor, ExecutorReport, ExecutorSettings, ExecutorState, ScenarioExecutor as _,
        StopSignal,
    },
    metrics::{MetricRegistry, MetricsSnapshot, ScenarioMetrics},
    scenario::{Scenario, Workload},
};

#[derive(Debug, Clone)]
pub struct RunCoordinator {
    exec: Executor,
    settings: ExecutorSettings,
}

impl RunCoordinator {
    pub fn new(exec: Executor) -> Self {
        Self {
            exec,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate all scenarios and start an executor for each of them.
    ///
    /// Nothing is spawned unless every scenario is valid.
    pub fn start<W: Workload>(&self, scenarios: Vec<Scenario<W>>) -> Result<RunHandle, BoxError> {
        if scenarios.is_empty() {
            return Err(BoxError::from("no scenarios to run"));
        }
        self.settings
            .validate()
            .context("invalid executor settings")?;

        let mut names = HashSet::with_capacity(scenarios.len());
        for scenario in &scenarios {
            if scenario.name.is_empty() {
                return Err(BoxError::from("scenario name cannot be empty"));
            }
            if !names.insert(scenario.name.clone()) {
                return Err(BoxError::from("duplicate scenario name")
                    .context_field("scenario", scenario.name.clone()));
            }
            scenario
                .schedule
                .validate()
                .context("invalid scenario schedule")
                .with_context_field("scenario", || scenario.name.clone())?;
        }

        let mut executors = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let name = scenario.name.clone();
            let metrics = ScenarioMetrics::try_new(MetricRegistry::new())
                .context("register scenario metrics")
                .with_context_field("scenario", || name.clone())?;
            let executor = AnyExecutor::try_new(
                scenario,
                metrics.clone(),
                self.exec.clone(),
                self.settings.clone(),
            )
            .context("create scenario executor")
            .with_context_field("scenario", || name.clone())?;
            executors.push((metrics, executor));
        }

        let (stop_tx, stop) = StopSignal::new();
        let scenarios = executors
            .into_iter()
            .map(|(metrics, executor)| {
                let name = executor.scenario().clone();
                let state = executor.subscribe();
                tracing::debug!(scenario = %name, "spawn scenario executor");
                let task = self.exec.spawn_task(executor.run(stop.clone()));
                ScenarioRun {
                    name,
                    metrics,
                    state,
                    task,
                }
            })
            .collect();

        Ok(RunHandle {
            stop: stop_tx,
            started: Instant::now(),
            scenarios,
        })
    }
}

struct ScenarioRun {
    name: ArcStr,
    metrics: ScenarioMetrics,
    state: watch::Receiver<ExecutorState>,
    task: JoinHandle<ExecutorReport>,
}

/// Handle to a started run.
pub struct RunHandle {
    stop: watch::Sender<bool>,
    started: Instant,
    scenarios: Vec<ScenarioRun>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("started", &self.started)
            .field("scenarios", &self.probe().states())
            .finish()
    }
}

impl RunHandle {
    /// Request all scenarios to stop. Their workers are drained.
    pub fn stop(&self) {
        if !self.stop.send_replace(true) {
            tracing::info!("stop requested for all scenarios");
        }
    }

    /// Live snapshot of all metrics, per scenario.
    pub fn collect(&self) -> BTreeMap<ArcStr, MetricsSnapshot> {
        self.probe().collect()
    }

    /// Read-only view on the run,
    /// usable while [`RunHandle::await_completion`] is pending.
    pub fn probe(&self) -> RunProbe {
        RunProbe {
            started: self.started,
            scenarios: self
                .scenarios
                .iter()
                .map(|run| (run.name.clone(), run.metrics.clone(), run.state.clone()))
                .collect(),
        }
    }

    /// Wait for every executor to stop.
    pub async fn await_completion(self) -> RunSummary {
        let mut reports = Vec::with_capacity(self.scenarios.len());
        let mut snapshots = BTreeMap::new();
        let mut failures = Vec::new();

        for run in self.scenarios {
            match run.task.await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(scenario = %run.name, "scenario executor failed: {err}");
                    failures.push(InternalFailure {
                        scenario: run.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
            snapshots.insert(run.name, run.metrics.snapshot());
        }

        RunSummary {
            elapsed: self.started.elapsed(),
            reports,
            snapshots,
            failures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProbe {
    started: Instant,
    scenarios: Vec<(ArcStr, ScenarioMetrics, watch::Receiver<ExecutorState>)>,
}

impl RunProbe {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn collect(&self) -> BTreeMap<ArcStr, MetricsSnapshot> {
        self.scenarios
            .iter()
            .map(|(name, metrics, _)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    pub fn states(&self) -> BTreeMap<ArcStr, ExecutorState> {
        self.scenarios
            .iter()
            .map(|(name, _, state)| (name.clone(), *state.borrow()))
            .collect()
    }

    /// All executors stopped, or went away without reaching
    /// [`ExecutorState::Stopped`] (panic).
    pub fn is_finished(&self) -> bool {
        self.scenarios.iter().all(|(_, _, state)| {
            *state.borrow() == ExecutorState::Stopped || state.has_changed().is_err()
        })
    }
}

/// A scenario whose executor did not run to completion.
#[derive(Debug, Clone)]
pub struct InternalFailure {
    pub scenario: ArcStr,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub reports: Vec<ExecutorReport>,
    pub snapshots: BTreeMap<ArcStr, MetricsSnapshot>,
    pub failures: Vec<InternalFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
