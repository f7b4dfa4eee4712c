use std::{thread, time::Duration};

use super::*;

#[test]
fn test_trend_rejects_invalid_samples() {
    let trend = Trend::default();

    assert_eq!(
        trend.add(f64::NAN).map_err(|err| matches!(err, InvalidSample::NotFinite(_))),
        Err(true)
    );
    assert!(trend.add(f64::INFINITY).is_err());
    assert_eq!(trend.add(-1.), Err(InvalidSample::Negative(-1.)));
    trend.add(2.).unwrap();

    let snapshot = trend.snapshot();
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.sum, 2.);
}

#[test]
fn test_trend_snapshot_percentiles() {
    let trend = Trend::default();
    for v in (1..=100).rev() {
        trend.add(v as f64).unwrap();
    }

    let snapshot = trend.snapshot();
    assert_eq!(snapshot.count, 100);
    assert_eq!(snapshot.sum, 5050.);
    assert_eq!(snapshot.min, 1.);
    assert_eq!(snapshot.max, 100.);
    assert_eq!(snapshot.avg, 50.5);
    assert_eq!(snapshot.p50, 50.5);
    assert!((snapshot.p90 - 90.1).abs() < 1e-9, "p90 = {}", snapshot.p90);
    assert!((snapshot.p99 - 99.01).abs() < 1e-9, "p99 = {}", snapshot.p99);
}

#[test]
fn test_trend_empty_snapshot() {
    assert_eq!(Trend::default().snapshot(), TrendSnapshot::default());
}

#[test]
fn test_trend_add_duration_in_millis() {
    let trend = Trend::default();
    trend.add_duration(Duration::from_micros(1500));
    assert_eq!(trend.snapshot().max, 1.5);
}

#[test]
fn test_trend_snapshots_accumulate() {
    let trend = Trend::default();
    trend.add(3.).unwrap();
    trend.add(1.).unwrap();
    assert_eq!(trend.snapshot().count, 2);
    // nothing new recorded
    assert_eq!(trend.snapshot().count, 2);

    trend.add(2.).unwrap();
    let snapshot = trend.snapshot();
    assert_eq!(snapshot.count, 3);
    assert_eq!(snapshot.min, 1.);
    assert_eq!(snapshot.max, 3.);
    assert_eq!(snapshot.p50, 2.);
}

#[test]
fn test_trend_records_while_snapshot_in_progress() {
    let trend = Trend::default();
    trend.add(1.).unwrap();

    // holding the history lock stands in for a long running snapshot
    let history = trend.inner.history.lock();
    let writer = {
        let trend = trend.clone();
        thread::spawn(move || {
            for v in 0..1000 {
                trend.add(v as f64).unwrap();
            }
        })
    };
    writer.join().unwrap();
    drop(history);

    assert_eq!(trend.snapshot().count, 1001);
}

#[test]
fn test_rate_snapshot() {
    let rate = Rate::default();
    assert_eq!(rate.snapshot().rate, 0.);

    rate.add(true);
    rate.add(false);
    rate.add(false);
    rate.add(true);

    let snapshot = rate.snapshot();
    assert_eq!(snapshot.passes, 2);
    assert_eq!(snapshot.fails, 2);
    assert_eq!(snapshot.total(), 4);
    assert_eq!(snapshot.rate, 0.5);
}

#[test]
fn test_gauge_set_max_only_raises() {
    let gauge = Gauge::default();
    gauge.set_max(5);
    gauge.set_max(3);
    assert_eq!(gauge.get(), 5);
    gauge.set(1);
    assert_eq!(gauge.get(), 1);
}

#[test]
fn test_registry_returns_same_handle_for_same_name() {
    let registry = MetricRegistry::new();

    let a = registry.counter("hits").unwrap();
    let b = registry.counter("hits").unwrap();
    a.add(2);
    b.add(3);

    assert_eq!(registry.snapshot().get("hits"), Some(&MetricSnapshot::Counter(5)));
}

#[test]
fn test_registry_rejects_kind_mismatch_and_empty_name() {
    let registry = MetricRegistry::new();
    registry.rate("fails").unwrap();

    assert!(registry.trend("fails").is_err());
    assert!(registry.counter("").is_err());
}

#[test]
fn test_registries_are_isolated() {
    let a = MetricRegistry::new();
    let b = MetricRegistry::new();

    a.counter("n").unwrap().add(1);

    assert!(b.get("n").is_none());
    assert!(b.snapshot().is_empty());
}

#[test]
fn test_concurrent_writers_do_not_lose_samples() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1_000;

    let registry = MetricRegistry::new();
    let trend = registry.trend("duration").unwrap();
    let rate = registry.rate("failed").unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let trend = trend.clone();
            let rate = rate.clone();
            thread::spawn(move || {
                for j in 0..PER_THREAD {
                    trend.add((i * j) as f64).unwrap();
                    rate.add(j % 2 == 0);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = registry.snapshot();
    match snapshot.get("duration") {
        Some(MetricSnapshot::Trend(t)) => assert_eq!(t.count, (THREADS * PER_THREAD) as u64),
        other => panic!("unexpected snapshot: {other:?}"),
    }
    match snapshot.get("failed") {
        Some(MetricSnapshot::Rate(r)) => {
            assert_eq!(r.total(), (THREADS * PER_THREAD) as u64);
            assert_eq!(r.rate, 0.5);
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }
}
