use std::{sync::Arc, time::Duration};

use rama::{telemetry::tracing, utils::str::arcstr::ArcStr};
use tokio::sync::{mpsc, watch};

use crate::{metrics::ScenarioMetrics, scenario::Workload};

pub type WorkerId = u64;

#[derive(Debug)]
pub(super) enum WorkerEvent {
    /// An on-demand worker finished its iteration and waits for the next arrival.
    Idle(WorkerId),
    /// The worker task ended. `clean` is false when it panicked.
    Exited { id: WorkerId, clean: bool },
}

/// State shared by all workers of one scenario.
pub(super) struct WorkerContext<W> {
    pub(super) scenario: ArcStr,
    pub(super) workload: Arc<W>,
    pub(super) metrics: ScenarioMetrics,
    pub(super) pause: Duration,
}

impl<W: Workload> WorkerContext<W> {
    /// Runs one iteration: request, record, pause.
    ///
    /// Returns false if the worker got retired during the pause.
    async fn iterate(&self, retire: &mut watch::Receiver<bool>) -> bool {
        let outcome = self.workload.iterate().await;
        self.metrics.record(&outcome);
        self.metrics.iterations.add(1);

        if self.pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(self.pause) => (),
                _ = retire.changed() => return false,
            }
        }
        true
    }
}

/// Reports worker lifecycle changes back to the pool.
///
/// Dropped without [`WorkerSignal::finish`] means the worker did not return
/// normally, which the pool treats as a panic.
struct WorkerSignal {
    id: WorkerId,
    events: mpsc::UnboundedSender<WorkerEvent>,
    clean: bool,
}

impl WorkerSignal {
    fn idle(&self) -> bool {
        self.events.send(WorkerEvent::Idle(self.id)).is_ok()
    }

    fn finish(mut self) {
        self.clean = true;
    }
}

impl Drop for WorkerSignal {
    fn drop(&mut self) {
        let _ = self.events.send(WorkerEvent::Exited {
            id: self.id,
            clean: self.clean,
        });
    }
}

/// Closed-loop worker: iterates back-to-back until retired.
pub(super) async fn run_looping<W: Workload>(
    ctx: Arc<WorkerContext<W>>,
    id: WorkerId,
    mut retire: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let signal = WorkerSignal {
        id,
        events,
        clean: false,
    };
    tracing::trace!(scenario = %ctx.scenario, worker = id, "looping worker started");

    while !*retire.borrow() {
        if !ctx.iterate(&mut retire).await {
            break;
        }
    }

    tracing::trace!(scenario = %ctx.scenario, worker = id, "looping worker retired");
    signal.finish();
}

/// Arrival driven worker: runs one iteration per received trigger.
pub(super) async fn run_on_demand<W: Workload>(
    ctx: Arc<WorkerContext<W>>,
    id: WorkerId,
    mut retire: watch::Receiver<bool>,
    mut triggers: mpsc::Receiver<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let signal = WorkerSignal {
        id,
        events,
        clean: false,
    };
    tracing::trace!(scenario = %ctx.scenario, worker = id, "on-demand worker started");

    loop {
        tokio::select! {
            biased;

            _ = retire.changed() => break,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    break;
                }
            }
        }

        if !ctx.iterate(&mut retire).await || !signal.idle() {
            break;
        }
    }

    tracing::trace!(scenario = %ctx.scenario, worker = id, "on-demand worker retired");
    signal.finish();
}
