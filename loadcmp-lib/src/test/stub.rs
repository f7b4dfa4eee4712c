use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rama::http::StatusCode;

use crate::scenario::{RequestOutcome, Workload};

/// In-process stand-in for a target endpoint.
#[derive(Debug, Clone)]
pub(crate) struct StubWorkload {
    latency: Duration,
    status: StatusCode,
    panics_left: Arc<AtomicU64>,
    started: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
}

impl StubWorkload {
    pub(crate) fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub(crate) fn failing() -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn with_status(status: StatusCode) -> Self {
        Self {
            latency: Duration::ZERO,
            status,
            panics_left: Default::default(),
            started: Default::default(),
            completed: Default::default(),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Panic in the first `n` iterations.
    pub(crate) fn with_panics(self, n: u64) -> Self {
        self.panics_left.store(n, Ordering::SeqCst);
        self
    }

    /// Requests issued so far.
    pub(crate) fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Requests that got their response.
    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Workload for StubWorkload {
    async fn iterate(&self) -> RequestOutcome {
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("stub workload panic");
        }

        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        RequestOutcome::from_status(self.status, self.latency)
    }
}
