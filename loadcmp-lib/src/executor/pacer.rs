use std::time::Duration;

use rand::RngExt as _;
use tokio::time::{Instant, sleep_until};

/// Arrival pacer on an absolute timeline.
///
/// Arrival `n` is due at `start + n * interval`. A wake-up that comes late
/// does not shift the timeline: arrivals that fell due meanwhile are released
/// right away, so over a run the arrival count stays at `duration / interval`.
///
/// Jitter moves the wake-up of a single arrival by up to half an interval
/// (at jitter 1.0); the timeline itself is never jittered.
pub(super) struct ArrivalPacer {
    interval: Duration,
    next: Instant,
    jitter: f64,
}

impl ArrivalPacer {
    pub(super) fn new(interval: Duration, jitter: f64) -> Self {
        Self {
            interval: interval.max(Duration::from_nanos(1)),
            next: Instant::now(),
            jitter: if jitter.is_finite() {
                jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// Resolves once the next arrival is due.
    ///
    /// Cancel safe: the timeline only advances when an arrival is released.
    pub(super) async fn wait_one(&mut self) {
        let due = self.next;
        if Instant::now() < due {
            sleep_until(self.jittered(due)).await;
        }
        self.next = due + self.interval;
    }

    fn jittered(&self, due: Instant) -> Instant {
        if self.jitter <= 0.0 {
            return due;
        }

        let max_shift = self.interval.mul_f64(self.jitter / 2.0);
        let shift = max_shift.mul_f64(rand::rng().random_range(0.0..=1.0));
        if rand::random_bool(0.5) {
            due + shift
        } else {
            due.checked_sub(shift).unwrap_or(due)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{task::yield_now, time};

    #[tokio::test(flavor = "current_thread")]
    async fn first_arrival_is_immediate_and_no_burst_follows() {
        time::pause();

        let mut p = ArrivalPacer::new(Duration::from_millis(100), 0.0);
        p.wait_one().await;

        let h = tokio::spawn(async move {
            let mut p = p;
            p.wait_one().await;
            p
        });

        yield_now().await;
        assert!(!h.is_finished());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn releases_once_per_interval() {
        time::pause();

        let mut p = ArrivalPacer::new(Duration::from_millis(500), 0.0);
        p.wait_one().await;

        let h = tokio::spawn(async move {
            let mut p = p;
            p.wait_one().await;
            p
        });

        yield_now().await;
        assert!(!h.is_finished());

        time::advance(Duration::from_millis(499)).await;
        yield_now().await;
        assert!(!h.is_finished());

        time::advance(Duration::from_millis(1)).await;
        let _p = h.await.expect("task join");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn late_wake_up_releases_missed_arrivals() {
        time::pause();

        let mut p = ArrivalPacer::new(Duration::from_millis(10), 0.0);
        p.wait_one().await;

        time::advance(Duration::from_secs(1)).await;
        let now = Instant::now();

        // arrivals due at 10ms..=1000ms
        for _ in 0..100 {
            p.wait_one().await;
        }
        assert_eq!(Instant::now(), now);

        let h = tokio::spawn(async move {
            let mut p = p;
            p.wait_one().await;
            p
        });
        yield_now().await;
        assert!(!h.is_finished());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn long_run_converges_to_rate() {
        let mut p = ArrivalPacer::new(Duration::from_millis(20), 0.5);
        let start = Instant::now();
        for _ in 0..500 {
            p.wait_one().await;
        }
        let elapsed = start.elapsed().as_secs_f64();
        // 499 intervals of 20ms after the initial arrival, last wake-up +-5ms
        assert!((9.97..=9.99).contains(&elapsed), "elapsed: {elapsed}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn real_clock_keeps_arrival_count() {
        for (interval, expected) in [
            (Duration::from_millis(5), 200.),
            (Duration::from_micros(1000), 1000.),
            (Duration::from_micros(250), 4000.),
        ] {
            let mut p = ArrivalPacer::new(interval, 0.0);
            let window = tokio::time::sleep(Duration::from_secs(1));
            let mut window = std::pin::pin!(window);
            let mut arrivals = 0u32;
            loop {
                tokio::select! {
                    biased;
                    _ = window.as_mut() => break,
                    _ = p.wait_one() => arrivals += 1,
                }
            }

            let arrivals = f64::from(arrivals);
            assert!(
                (arrivals - expected).abs() / expected <= 0.05,
                "interval: {interval:?}, arrivals: {arrivals}, expected: {expected}"
            );
        }
    }

    #[test]
    fn jitter_bounds_are_respected() {
        let p = ArrivalPacer {
            interval: Duration::from_secs(10),
            next: Instant::now(),
            jitter: 0.5,
        };
        let due = Instant::now() + Duration::from_secs(100);

        for _ in 0..100 {
            let at = p.jittered(due);
            // jitter 0.5 on a 10s interval shifts by at most 2.5s
            assert!(at >= due - Duration::from_millis(2500));
            assert!(at <= due + Duration::from_millis(2500));
        }
    }

    #[test]
    fn invalid_jitter_is_ignored() {
        let p = ArrivalPacer::new(Duration::from_secs(1), f64::NAN);
        let due = Instant::now();
        assert_eq!(p.jittered(due), due);
    }
}
