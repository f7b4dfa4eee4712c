use std::time::Duration;

use super::*;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn ramp_up_down() -> RampingSchedule {
    RampingSchedule::new(
        50,
        [
            Stage::new(Duration::from_secs(5), 200),
            Stage::new(Duration::from_secs(5), 120),
        ],
    )
}

#[test]
fn test_desired_concurrency_interpolates_stages() {
    let schedule = ramp_up_down();

    for (elapsed, expected) in [
        (0., 50),
        (2.5, 125),
        (5., 200),
        (7.5, 160),
        (10., 120),
        (60., 120),
    ] {
        assert_eq!(
            schedule.desired_concurrency(secs(elapsed)),
            expected,
            "elapsed: {elapsed}s"
        );
    }
}

#[test]
fn test_desired_concurrency_ramp_down_to_zero() {
    let schedule = RampingSchedule::new(
        0,
        [
            Stage::new(Duration::from_secs(2), 10),
            Stage::new(Duration::from_secs(2), 0),
            Stage::new(Duration::from_secs(2), 4),
        ],
    );

    assert_eq!(schedule.desired_concurrency(secs(1.)), 5);
    assert_eq!(schedule.desired_concurrency(secs(3.)), 5);
    assert_eq!(schedule.desired_concurrency(secs(4.)), 0);
    assert_eq!(schedule.desired_concurrency(secs(5.)), 2);
    assert_eq!(schedule.desired_concurrency(secs(6.)), 4);
}

#[test]
fn test_stage_ends_and_total_duration() {
    let schedule = ramp_up_down();
    assert_eq!(
        schedule.stage_ends().collect::<Vec<_>>(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
    assert_eq!(schedule.total_duration(), Duration::from_secs(10));
}

#[test]
fn test_ramping_validation() {
    assert_eq!(
        RampingSchedule::new(1, []).validate(),
        Err(ScheduleError::NoStages)
    );
    assert_eq!(
        RampingSchedule::new(
            1,
            [
                Stage::new(Duration::from_secs(1), 1),
                Stage::new(Duration::ZERO, 1)
            ]
        )
        .validate(),
        Err(ScheduleError::ZeroStageDuration { index: 1 })
    );
    assert_eq!(ramp_up_down().validate(), Ok(()));
}

fn arrival(rate: u32, pre_allocated_workers: usize, max_workers: usize) -> ArrivalRateSchedule {
    ArrivalRateSchedule {
        duration: Duration::from_secs(10),
        rate,
        time_unit: Duration::from_secs(1),
        pre_allocated_workers,
        max_workers,
    }
}

#[test]
fn test_arrival_validation() {
    assert_eq!(arrival(10, 1, 5).validate(), Ok(()));
    assert_eq!(arrival(0, 1, 5).validate(), Err(ScheduleError::ZeroRate));
    assert_eq!(arrival(10, 0, 0).validate(), Err(ScheduleError::ZeroMaxWorkers));
    assert_eq!(
        arrival(10, 6, 5).validate(),
        Err(ScheduleError::PreAllocatedExceedsMax {
            pre_allocated: 6,
            max: 5
        })
    );

    let mut schedule = arrival(10, 1, 5);
    schedule.time_unit = Duration::ZERO;
    assert_eq!(schedule.validate(), Err(ScheduleError::ZeroTimeUnit));

    let mut schedule = arrival(10, 1, 5);
    schedule.duration = Duration::ZERO;
    assert_eq!(schedule.validate(), Err(ScheduleError::ZeroDuration));
}

#[test]
fn test_next_arrival_delay_is_fixed() {
    let mut schedule = arrival(4, 1, 5);
    assert_eq!(schedule.next_arrival_delay(), Duration::from_millis(250));

    schedule.time_unit = Duration::from_secs(60);
    schedule.rate = 120;
    assert_eq!(schedule.next_arrival_delay(), Duration::from_millis(500));
}

#[test]
fn test_deserialize_schedules() {
    let ramping: ScenarioSchedule = serde_json::from_str(
        r#"{
            "executor": "ramping",
            "start_workers": 50,
            "stages": [
                { "duration": "5s", "target": 200 },
                { "duration": 5, "target": 120 }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(ramping, ScenarioSchedule::Ramping(ramp_up_down()));
    assert_eq!(ramping.executor_kind(), "ramping");
    assert_eq!(ramping.total_duration(), Duration::from_secs(10));

    let arrival_rate: ScenarioSchedule = serde_json::from_str(
        r#"{
            "executor": "constant-arrival-rate",
            "duration": "10s",
            "rate": 10,
            "pre_allocated_workers": 1,
            "max_workers": 5
        }"#,
    )
    .unwrap();
    assert_eq!(
        arrival_rate,
        ScenarioSchedule::ConstantArrivalRate(arrival(10, 1, 5))
    );

    assert!(serde_json::from_str::<ScenarioSchedule>(r#"{"executor": "per-vu-iterations"}"#).is_err());
}
