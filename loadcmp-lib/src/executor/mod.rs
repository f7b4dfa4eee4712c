//! Schedule driven control loops.
//!
//! Each scenario is driven by exactly one executor, which owns its
//! [`WorkerPool`] and moves through
//! [`ExecutorState::Idle`] → [`ExecutorState::Running`] →
//! [`ExecutorState::Draining`] → [`ExecutorState::Stopped`].

use std::{fmt, time::Duration};

use rama::{
    error::{BoxError, ErrorExt as _},
    rt::Executor,
    telemetry::tracing,
    utils::str::arcstr::ArcStr,
};
use tokio::sync::watch;

use crate::{
    metrics::ScenarioMetrics,
    pool::{DrainReport, WorkerPool},
    scenario::{Scenario, Workload},
    schedule::{ScenarioSchedule, ScheduleError},
};

mod arrival;
mod pacer;
mod ramping;

pub use self::{arrival::ConstantArrivalExecutor, ramping::RampingExecutor};


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutorState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Running => "running",
            ExecutorState::Draining => "draining",
            ExecutorState::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Interval at which a ramping executor re-evaluates its schedule.
    pub tick: Duration,
    /// Upper bound for waiting on in-flight requests when workers retire.
    pub drain_timeout: Duration,
    /// Hard ceiling for ramping pools.
    pub worker_limit: Option<usize>,
    /// Relative jitter (0..=1) applied to arrival pacing sleeps.
    pub arrival_jitter: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(30),
            worker_limit: None,
            arrival_jitter: 0.0,
        }
    }
}

impl ExecutorSettings {
    pub fn validate(&self) -> Result<(), BoxError> {
        if self.tick.is_zero() {
            return Err(BoxError::from("executor tick must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.arrival_jitter) {
            return Err(BoxError::from("arrival jitter must be within [0, 1]")
                .context_field("arrival_jitter", self.arrival_jitter));
        }
        if self.worker_limit == Some(0) {
            return Err(BoxError::from("worker limit must be greater than zero"));
        }
        Ok(())
    }
}

/// Stop request shared by all executors of a run.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop is requested.
    ///
    /// Never resolves when the sender is dropped without requesting a stop.
    pub async fn stopped(&mut self) {
        if self.0.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// What an executor did, produced once it reached [`ExecutorState::Stopped`].
#[derive(Debug, Clone)]
pub struct ExecutorReport {
    pub scenario: ArcStr,
    pub kind: &'static str,
    /// Live workers right after each stage boundary (ramping only).
    pub stage_workers: Vec<usize>,
    pub arrivals: u64,
    pub dropped_arrivals: u64,
    pub spawn_failures: u64,
    /// Whether the run was cut short by a stop request.
    pub stopped_early: bool,
    pub elapsed: Duration,
    pub drain: DrainReport,
}

impl ExecutorReport {
    fn new(scenario: ArcStr, kind: &'static str) -> Self {
        Self {
            scenario,
            kind,
            stage_workers: Vec::new(),
            arrivals: 0,
            dropped_arrivals: 0,
            spawn_failures: 0,
            stopped_early: false,
            elapsed: Duration::ZERO,
            drain: DrainReport::default(),
        }
    }
}

/// Drives one scenario from start to [`ExecutorState::Stopped`].
pub trait ScenarioExecutor: Send + 'static {
    fn scenario(&self) -> &ArcStr;

    /// Observe state transitions.
    fn subscribe(&self) -> watch::Receiver<ExecutorState>;

    fn run(self, stop: StopSignal) -> impl Future<Output = ExecutorReport> + Send;
}

/// Executor picked by the kind of the scenario schedule.
#[derive(Debug)]
pub enum AnyExecutor<W> {
    Ramping(RampingExecutor<W>),
    ConstantArrival(ConstantArrivalExecutor<W>),
}

impl<W: Workload> AnyExecutor<W> {
    pub fn try_new(
        scenario: Scenario<W>,
        metrics: ScenarioMetrics,
        exec: Executor,
        settings: ExecutorSettings,
    ) -> Result<Self, ScheduleError> {
        scenario.schedule.validate()?;
        Ok(match scenario.schedule.clone() {
            ScenarioSchedule::Ramping(schedule) => Self::Ramping(RampingExecutor::new(
                scenario, schedule, metrics, exec, settings,
            )),
            ScenarioSchedule::ConstantArrivalRate(schedule) => Self::ConstantArrival(
                ConstantArrivalExecutor::new(scenario, schedule, metrics, exec, settings),
            ),
        })
    }
}

impl<W: Workload> ScenarioExecutor for AnyExecutor<W> {
    fn scenario(&self) -> &ArcStr {
        match self {
            AnyExecutor::Ramping(executor) => executor.scenario(),
            AnyExecutor::ConstantArrival(executor) => executor.scenario(),
        }
    }

    fn subscribe(&self) -> watch::Receiver<ExecutorState> {
        match self {
            AnyExecutor::Ramping(executor) => executor.subscribe(),
            AnyExecutor::ConstantArrival(executor) => executor.subscribe(),
        }
    }

    async fn run(self, stop: StopSignal) -> ExecutorReport {
        match self {
            AnyExecutor::Ramping(executor) => executor.run(stop).await,
            AnyExecutor::ConstantArrival(executor) => executor.run(stop).await,
        }
    }
}

/// Pool, metrics and state shared by both executor kinds.
struct ExecutorCore<W> {
    scenario: ArcStr,
    pool: WorkerPool<W>,
    metrics: ScenarioMetrics,
    settings: ExecutorSettings,
    state: watch::Sender<ExecutorState>,
}

impl<W> fmt::Debug for ExecutorCore<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorCore")
            .field("scenario", &self.scenario)
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<W: Workload> ExecutorCore<W> {
    fn new(
        scenario: &Scenario<W>,
        metrics: ScenarioMetrics,
        exec: Executor,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            scenario: scenario.name.clone(),
            pool: WorkerPool::new(scenario, metrics.clone(), exec),
            metrics,
            settings,
            state: watch::channel(ExecutorState::Idle).0,
        }
    }

    fn transition(&self, to: ExecutorState) {
        let from = self.state.send_replace(to);
        tracing::debug!(scenario = %self.scenario, %from, %to, "executor state transition");
    }

    /// Running → Draining → Stopped.
    async fn drain(&mut self, report: &mut ExecutorReport) {
        self.transition(ExecutorState::Draining);
        report.drain = self.pool.drain_all(self.settings.drain_timeout).await;
        self.transition(ExecutorState::Stopped);

        tracing::info!(
            scenario = %self.scenario,
            exited = report.drain.exited,
            cancelled = report.drain.cancelled,
            "scenario stopped",
        );
    }
}
