//! Run configuration: a built-in traffic shape applied to both backends,
//! or a JSON file describing every scenario.

use std::{collections::BTreeMap, path::Path, time::Duration};

use loadcmp_lib::{
    schedule::{ArrivalRateSchedule, RampingSchedule, ScenarioSchedule, Stage},
    utils::time::deserialize_duration,
};
use rama::error::{BoxError, ErrorContext as _};
use serde::Deserialize;

pub const POOLED_SCENARIO: &str = "pooled_server";
pub const SPAWNING_SCENARIO: &str = "spawning_server";

pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// Traffic shape applied to both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Shape {
    /// 50 workers, ramp to 200 over 5s, then down to 120 over 5s.
    Ramping,
    /// 200 arrivals per second for 10s, 50 to 200 workers.
    ConstantArrivalRate,
}

impl Shape {
    pub fn schedule(self) -> ScenarioSchedule {
        match self {
            Shape::Ramping => ScenarioSchedule::Ramping(RampingSchedule::new(
                50,
                [
                    Stage::new(Duration::from_secs(5), 200),
                    Stage::new(Duration::from_secs(5), 120),
                ],
            )),
            Shape::ConstantArrivalRate => {
                ScenarioSchedule::ConstantArrivalRate(ArrivalRateSchedule {
                    duration: Duration::from_secs(10),
                    rate: 200,
                    time_unit: Duration::from_secs(1),
                    pre_allocated_workers: 50,
                    max_workers: 200,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Pause at the end of every iteration.
    #[serde(default = "default_pause", deserialize_with = "deserialize_duration")]
    pub pause: Duration,
    pub scenarios: BTreeMap<String, ScenarioConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// `host:port` or full uri of the target.
    pub target: String,
    #[serde(flatten)]
    pub schedule: ScenarioSchedule,
}

fn default_pause() -> Duration {
    DEFAULT_PAUSE
}

impl RunConfig {
    /// Same shape against the pooled and the spawning backend.
    pub fn preset(shape: Shape, pooled: &str, spawning: &str) -> Self {
        let schedule = shape.schedule();
        Self {
            pause: DEFAULT_PAUSE,
            scenarios: [(POOLED_SCENARIO, pooled), (SPAWNING_SCENARIO, spawning)]
                .into_iter()
                .map(|(name, target)| {
                    (
                        name.to_owned(),
                        ScenarioConfig {
                            target: target.to_owned(),
                            schedule: schedule.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, BoxError> {
        serde_json::from_str(raw).context("parse run config json")
    }

    pub async fn load(path: &Path) -> Result<Self, BoxError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .context("read run config file")
            .with_context_debug_field("path", || path.to_owned())?;
        Self::from_json(&raw).with_context_debug_field("path", || path.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_targets_both_backends() {
        let cfg = RunConfig::preset(Shape::Ramping, "127.0.0.1:7878", "127.0.0.1:7879");
        assert_eq!(cfg.pause, DEFAULT_PAUSE);
        assert_eq!(cfg.scenarios.len(), 2);
        assert_eq!(cfg.scenarios[POOLED_SCENARIO].target, "127.0.0.1:7878");
        assert_eq!(cfg.scenarios[SPAWNING_SCENARIO].target, "127.0.0.1:7879");
        assert_eq!(
            cfg.scenarios[POOLED_SCENARIO].schedule,
            cfg.scenarios[SPAWNING_SCENARIO].schedule
        );
        for shape in [Shape::Ramping, Shape::ConstantArrivalRate] {
            assert!(shape.schedule().validate().is_ok(), "shape: {shape:?}");
        }
    }

    #[test]
    fn test_parse_run_config() {
        let cfg = RunConfig::from_json(
            r#"{
                "pause": "250ms",
                "scenarios": {
                    "pooled": {
                        "target": "127.0.0.1:7878",
                        "executor": "ramping",
                        "start_workers": 10,
                        "stages": [
                            { "duration": "5s", "target": 20 },
                            { "duration": 2.5, "target": 0 }
                        ]
                    },
                    "spawning": {
                        "target": "http://127.0.0.1:7879/",
                        "executor": "constant-arrival-rate",
                        "duration": "1m",
                        "rate": 50,
                        "pre_allocated_workers": 5,
                        "max_workers": 25
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.pause, Duration::from_millis(250));
        assert_eq!(
            cfg.scenarios["pooled"].schedule,
            ScenarioSchedule::Ramping(RampingSchedule::new(
                10,
                [
                    Stage::new(Duration::from_secs(5), 20),
                    Stage::new(Duration::from_millis(2500), 0),
                ]
            ))
        );
        let ScenarioSchedule::ConstantArrivalRate(arrivals) = &cfg.scenarios["spawning"].schedule
        else {
            panic!("unexpected schedule: {:?}", cfg.scenarios["spawning"].schedule);
        };
        assert_eq!(arrivals.duration, Duration::from_secs(60));
        assert_eq!(arrivals.time_unit, Duration::from_secs(1));
        assert_eq!(arrivals.max_workers, 25);
    }

    #[test]
    fn test_parse_run_config_defaults_and_errors() {
        let cfg = RunConfig::from_json(
            r#"{"scenarios": {"a": {"target": "localhost:80", "executor": "ramping", "stages": [{"duration": "1s", "target": 1}]}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.pause, DEFAULT_PAUSE);

        assert!(RunConfig::from_json("{}").is_err());
        assert!(
            RunConfig::from_json(r#"{"scenarios": {"a": {"target": "x", "executor": "closed"}}}"#)
                .is_err()
        );
    }
}
