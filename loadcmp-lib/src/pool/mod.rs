//! Bounded, resizable set of virtual users.
//!
//! The pool is owned and mutated by a single executor. Workers never touch
//! the pool directly: they report state changes over an unbounded channel,
//! which the pool drains whenever the executor calls into it.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use rama::{rt::Executor, telemetry::tracing, utils::str::arcstr::ArcStr};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    metrics::ScenarioMetrics,
    scenario::{Scenario, Workload},
};

mod worker;

pub use self::worker::WorkerId;
use self::worker::{WorkerContext, WorkerEvent};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for an arrival (on-demand workers only).
    Idle,
    Running,
    /// Signalled to exit once its in-flight request is recorded.
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Handed to an idle worker.
    Dispatched(WorkerId),
    /// Handed to a worker spawned for this arrival.
    Spawned(WorkerId),
    /// No capacity left: the arrival is discarded.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    Exhausted { limit: usize },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Exhausted { limit } => {
                write!(f, "SpawnError: worker limit of {limit} reached")
            }
        }
    }
}

impl std::error::Error for SpawnError {}

/// How a drain ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Workers that exited on their own.
    pub exited: usize,
    /// Workers aborted after the drain timeout, their in-flight work discarded.
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy)]
enum WorkerMode {
    Looping,
    OnDemand,
}

struct WorkerSlot {
    state: WorkerState,
    retire: watch::Sender<bool>,
    trigger: Option<mpsc::Sender<()>>,
    handle: JoinHandle<()>,
}

pub struct WorkerPool<W> {
    ctx: Arc<WorkerContext<W>>,
    exec: Executor,
    limit: Option<usize>,
    workers: BTreeMap<WorkerId, WorkerSlot>,
    next_id: WorkerId,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl<W> fmt::Debug for WorkerPool<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("scenario", &self.ctx.scenario)
            .field("limit", &self.limit)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl<W: Workload> WorkerPool<W> {
    pub fn new(scenario: &Scenario<W>, metrics: ScenarioMetrics, exec: Executor) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            ctx: Arc::new(WorkerContext {
                scenario: scenario.name.clone(),
                workload: scenario.workload.clone(),
                metrics,
                pause: scenario.pause,
            }),
            exec,
            limit: None,
            workers: BTreeMap::new(),
            next_id: 0,
            events_tx,
            events_rx,
        }
    }

    /// Cap the number of workers alive at the same time,
    /// terminating ones included.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn scenario(&self) -> &ArcStr {
        &self.ctx.scenario
    }

    /// Workers that are not terminating.
    pub fn live(&self) -> usize {
        self.count(|state| state != WorkerState::Terminating)
    }

    pub fn idle(&self) -> usize {
        self.count(|state| state == WorkerState::Idle)
    }

    pub fn terminating(&self) -> usize {
        self.count(|state| state == WorkerState::Terminating)
    }

    /// All worker tasks still alive, terminating ones included.
    pub fn total(&self) -> usize {
        self.workers.len()
    }

    fn count(&self, f: impl Fn(WorkerState) -> bool) -> usize {
        self.workers.values().filter(|slot| f(slot.state)).count()
    }

    /// Converge the live worker count to `target`.
    ///
    /// Growing spawns looping workers. Shrinking signals the most recently
    /// spawned workers, which exit after recording their in-flight request.
    /// Growth stops at the worker limit with a [`SpawnError`].
    pub fn resize(&mut self, target: usize) -> Result<(), SpawnError> {
        self.process_events();

        let live = self.live();
        let result = if target > live {
            (live..target).try_for_each(|_| self.spawn(WorkerMode::Looping).map(|_| ()))
        } else {
            let excess: Vec<_> = self
                .workers
                .iter()
                .rev()
                .filter(|(_, slot)| slot.state != WorkerState::Terminating)
                .take(live - target)
                .map(|(id, _)| *id)
                .collect();
            for id in excess {
                self.retire(id);
            }
            Ok(())
        };

        self.update_gauges();
        result
    }

    /// Spawn `count` idle on-demand workers.
    pub fn prefill(&mut self, count: usize) -> Result<(), SpawnError> {
        let result = (0..count).try_for_each(|_| self.spawn(WorkerMode::OnDemand).map(|_| ()));
        self.update_gauges();
        result
    }

    /// Hand one arrival to an idle worker, spawning one if none is idle
    /// and the limit allows it. Never blocks and never queues.
    pub fn acquire_for_arrival(&mut self) -> Arrival {
        self.process_events();

        let idle: Vec<_> = self
            .workers
            .iter()
            .filter(|(_, slot)| slot.state == WorkerState::Idle)
            .map(|(id, _)| *id)
            .collect();
        for id in idle {
            if self.trigger(id) {
                return Arrival::Dispatched(id);
            }
        }

        let arrival = match self.spawn(WorkerMode::OnDemand) {
            Ok(id) if self.trigger(id) => Arrival::Spawned(id),
            Ok(id) => {
                tracing::debug!(scenario = %self.ctx.scenario, worker = id, "fresh worker refused arrival");
                Arrival::Dropped
            }
            Err(_) => Arrival::Dropped,
        };
        self.update_gauges();
        arrival
    }

    /// Signal all workers and wait for them to exit.
    ///
    /// Workers still running after `timeout` are aborted:
    /// their in-flight iteration is never recorded.
    pub async fn drain_all(&mut self, timeout: Duration) -> DrainReport {
        self.process_events();
        let ids: Vec<_> = self.workers.keys().copied().collect();
        for id in ids {
            self.retire(id);
        }
        self.wait_terminated(timeout).await
    }

    /// Wait until every terminating worker exited,
    /// aborting the remaining ones after `timeout`.
    pub async fn wait_terminated(&mut self, timeout: Duration) -> DrainReport {
        let waiting = self.terminating();
        if tokio::time::timeout(timeout, self.recv_until_terminated())
            .await
            .is_err()
        {
            tracing::warn!(
                scenario = %self.ctx.scenario,
                timeout = ?timeout,
                remaining = self.terminating(),
                "drain timeout elapsed: cancel remaining workers",
            );
        }

        let stragglers: Vec<_> = self
            .workers
            .iter()
            .filter(|(_, slot)| slot.state == WorkerState::Terminating)
            .map(|(id, _)| *id)
            .collect();
        for id in &stragglers {
            if let Some(slot) = self.workers.remove(id) {
                slot.handle.abort();
                let _ = slot.handle.await;
            }
        }

        self.update_gauges();
        DrainReport {
            exited: waiting.saturating_sub(stragglers.len()),
            cancelled: stragglers.len(),
        }
    }

    async fn recv_until_terminated(&mut self) {
        while self.terminating() > 0 {
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event),
                // the pool owns a sender: never closed
                None => return,
            }
        }
    }

    fn spawn(&mut self, mode: WorkerMode) -> Result<WorkerId, SpawnError> {
        if let Some(limit) = self.limit
            && self.workers.len() >= limit
        {
            return Err(SpawnError::Exhausted { limit });
        }

        let id = self.next_id;
        self.next_id += 1;

        let (retire, retire_rx) = watch::channel(false);
        let ctx = self.ctx.clone();
        let events = self.events_tx.clone();

        let slot = match mode {
            WorkerMode::Looping => WorkerSlot {
                state: WorkerState::Running,
                retire,
                trigger: None,
                handle: self
                    .exec
                    .spawn_task(worker::run_looping(ctx, id, retire_rx, events)),
            },
            WorkerMode::OnDemand => {
                let (trigger, triggers) = mpsc::channel(1);
                WorkerSlot {
                    state: WorkerState::Idle,
                    retire,
                    trigger: Some(trigger),
                    handle: self.exec.spawn_task(worker::run_on_demand(
                        ctx, id, retire_rx, triggers, events,
                    )),
                }
            }
        };

        tracing::trace!(scenario = %self.ctx.scenario, worker = id, ?mode, "spawned worker");
        self.workers.insert(id, slot);
        Ok(id)
    }

    fn trigger(&mut self, id: WorkerId) -> bool {
        let Some(slot) = self.workers.get_mut(&id) else {
            return false;
        };
        let sent = slot
            .trigger
            .as_ref()
            .is_some_and(|trigger| trigger.try_send(()).is_ok());
        if sent {
            slot.state = WorkerState::Running;
        }
        sent
    }

    fn retire(&mut self, id: WorkerId) {
        if let Some(slot) = self.workers.get_mut(&id) {
            slot.state = WorkerState::Terminating;
            slot.trigger = None;
            slot.retire.send_replace(true);
        }
    }

    fn process_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Idle(id) => {
                if let Some(slot) = self.workers.get_mut(&id)
                    && slot.state == WorkerState::Running
                {
                    slot.state = WorkerState::Idle;
                }
            }
            WorkerEvent::Exited { id, clean } => {
                // aborted workers are removed before their exit event arrives
                if self.workers.remove(&id).is_some() && !clean {
                    self.ctx.metrics.worker_panics.add(1);
                    tracing::error!(
                        scenario = %self.ctx.scenario,
                        worker = id,
                        "worker panicked during its iteration: worker retired",
                    );
                }
            }
        }
    }

    fn update_gauges(&self) {
        self.ctx.metrics.set_workers(self.live());
    }
}

impl<W> Drop for WorkerPool<W> {
    fn drop(&mut self) {
        for slot in self.workers.values() {
            slot.handle.abort();
        }
    }
}
