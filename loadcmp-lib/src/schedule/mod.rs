//! Declarative traffic shapes.
//!
//! A [`ScenarioSchedule`] describes how much load a scenario generates over
//! time: either a ramp of live workers ([`RampingSchedule`]) or a fixed
//! arrival rate on top of an elastic worker pool ([`ArrivalRateSchedule`]).
//! Schedules are immutable once validated.

use std::{fmt, time::Duration};

use serde::Deserialize;

use crate::utils::time::deserialize_duration;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ScenarioSchedule {
    Ramping(RampingSchedule),
    ConstantArrivalRate(ArrivalRateSchedule),
}

impl ScenarioSchedule {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            ScenarioSchedule::Ramping(schedule) => schedule.validate(),
            ScenarioSchedule::ConstantArrivalRate(schedule) => schedule.validate(),
        }
    }

    /// Time the scenario generates load, excluding drains.
    pub fn total_duration(&self) -> Duration {
        match self {
            ScenarioSchedule::Ramping(schedule) => schedule.total_duration(),
            ScenarioSchedule::ConstantArrivalRate(schedule) => schedule.duration,
        }
    }

    pub fn executor_kind(&self) -> &'static str {
        match self {
            ScenarioSchedule::Ramping(_) => "ramping",
            ScenarioSchedule::ConstantArrivalRate(_) => "constant-arrival-rate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Stage {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub const fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Live worker count interpolated linearly over consecutive stages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RampingSchedule {
    #[serde(default)]
    pub start_workers: usize,
    pub stages: Vec<Stage>,
}

impl RampingSchedule {
    pub fn new(start_workers: usize, stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            start_workers,
            stages: stages.into_iter().collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.stages.is_empty() {
            return Err(ScheduleError::NoStages);
        }
        if let Some(index) = self.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ScheduleError::ZeroStageDuration { index });
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Elapsed time at which each stage ends.
    pub fn stage_ends(&self) -> impl Iterator<Item = Duration> + '_ {
        self.stages.iter().scan(Duration::ZERO, |end, stage| {
            *end += stage.duration;
            Some(*end)
        })
    }

    /// Worker count wanted after `elapsed` time since the scenario start.
    ///
    /// Within a stage the count moves linearly from the previous target
    /// (or `start_workers`) to the stage target, which is reached exactly at
    /// the end of the stage. After the last stage the final target holds.
    pub fn desired_concurrency(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start_workers;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = stage.target as f64 - from as f64;
                return (from as f64 + delta * progress).round().max(0.) as usize;
            }
            stage_start = stage_end;
            from = stage.target;
        }

        from
    }
}

/// Fixed arrival rate served by a pool bounded by
/// `pre_allocated_workers` and `max_workers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArrivalRateSchedule {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Arrivals per `time_unit`.
    pub rate: u32,
    #[serde(
        default = "ArrivalRateSchedule::default_time_unit",
        deserialize_with = "deserialize_duration"
    )]
    pub time_unit: Duration,
    pub pre_allocated_workers: usize,
    pub max_workers: usize,
}

impl ArrivalRateSchedule {
    fn default_time_unit() -> Duration {
        Duration::from_secs(1)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.duration.is_zero() {
            return Err(ScheduleError::ZeroDuration);
        }
        if self.rate == 0 {
            return Err(ScheduleError::ZeroRate);
        }
        if self.time_unit.is_zero() {
            return Err(ScheduleError::ZeroTimeUnit);
        }
        if self.max_workers == 0 {
            return Err(ScheduleError::ZeroMaxWorkers);
        }
        if self.pre_allocated_workers > self.max_workers {
            return Err(ScheduleError::PreAllocatedExceedsMax {
                pre_allocated: self.pre_allocated_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }

    /// Fixed interval between two arrivals: `time_unit / rate`.
    pub fn next_arrival_delay(&self) -> Duration {
        self.time_unit / self.rate.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    NoStages,
    ZeroStageDuration { index: usize },
    ZeroDuration,
    ZeroRate,
    ZeroTimeUnit,
    ZeroMaxWorkers,
    PreAllocatedExceedsMax { pre_allocated: usize, max: usize },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NoStages => write!(f, "ScheduleError: ramping schedule has no stages"),
            ScheduleError::ZeroStageDuration { index } => {
                write!(f, "ScheduleError: stage #{index} has a zero duration")
            }
            ScheduleError::ZeroDuration => write!(f, "ScheduleError: duration must be > 0"),
            ScheduleError::ZeroRate => write!(f, "ScheduleError: rate must be > 0"),
            ScheduleError::ZeroTimeUnit => write!(f, "ScheduleError: time unit must be > 0"),
            ScheduleError::ZeroMaxWorkers => write!(f, "ScheduleError: max workers must be > 0"),
            ScheduleError::PreAllocatedExceedsMax { pre_allocated, max } => write!(
                f,
                "ScheduleError: pre-allocated workers ({pre_allocated}) exceed max workers ({max})"
            ),
        }
    }
}

impl std::error::Error for ScheduleError {}
