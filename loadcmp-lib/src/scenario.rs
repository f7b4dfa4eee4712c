use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rama::{http::StatusCode, utils::str::arcstr::ArcStr};

use crate::schedule::ScenarioSchedule;

/// Unit of work executed by a worker once per iteration.
///
/// Implementations must not panic for request-level failures:
/// those are reported as a failed [`RequestOutcome`].
pub trait Workload: Send + Sync + 'static {
    fn iterate(&self) -> impl Future<Output = RequestOutcome> + Send + '_;
}

impl<F, Fut> Workload for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestOutcome> + Send + 'static,
{
    fn iterate(&self) -> impl Future<Output = RequestOutcome> + Send + '_ {
        (self)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A response was received, but its status is not 200.
    HttpStatus,
    /// Connecting, sending or receiving failed.
    Transport,
    /// No complete response within the request timeout.
    Timeout,
}

/// Result of a single request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub duration: Duration,
    pub status: Option<StatusCode>,
    pub failure: Option<FailureKind>,
    pub timestamp: SystemTime,
}

impl RequestOutcome {
    /// Outcome for a received response, classified by its status.
    pub fn from_status(status: StatusCode, duration: Duration) -> Self {
        Self {
            duration,
            status: Some(status),
            failure: (status != StatusCode::OK).then_some(FailureKind::HttpStatus),
            timestamp: SystemTime::now(),
        }
    }

    pub fn failed(failure: FailureKind, duration: Duration) -> Self {
        Self {
            duration,
            status: None,
            failure: Some(failure),
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.status == Some(StatusCode::OK)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.
    }
}

/// A named workload bound to a traffic shape.
#[derive(Debug)]
pub struct Scenario<W> {
    pub name: ArcStr,
    pub workload: Arc<W>,
    pub schedule: ScenarioSchedule,
    /// Pause at the end of every iteration.
    pub pause: Duration,
}

impl<W> Clone for Scenario<W> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            workload: self.workload.clone(),
            schedule: self.schedule.clone(),
            pause: self.pause,
        }
    }
}

impl<W: Workload> Scenario<W> {
    pub fn new(name: impl Into<ArcStr>, workload: W, schedule: ScenarioSchedule) -> Self {
        Self {
            name: name.into(),
            workload: Arc::new(workload),
            schedule,
            pause: Duration::ZERO,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}
