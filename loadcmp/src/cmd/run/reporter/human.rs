use loadcmp_lib::coordinator::RunSummary;
use rama::utils::str::arcstr::ArcStr;

use super::{IntervalRps, Progress, Reporter, ScenarioStats};

pub struct HumanReporter {
    interval: std::time::Duration,
    last_tick: std::time::Duration,
    rps: IntervalRps,
}

impl HumanReporter {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            last_tick: std::time::Duration::ZERO,
            rps: IntervalRps::default(),
        }
    }
}

impl Reporter for HumanReporter {
    fn on_progress(&mut self, progress: &Progress<'_>) {
        if progress.elapsed.saturating_sub(self.last_tick) < self.interval {
            return;
        }
        self.last_tick = progress.elapsed;

        let rps = self.rps.update(progress);
        for (name, snapshot) in progress.snapshots {
            let stats = ScenarioStats::from_snapshot(snapshot);
            println!(
                "t={:.1}s scenario={} state={} workers={} rps={:.1} reqs={} fail_rate={:.4} avg={:.2}ms",
                progress.elapsed.as_secs_f64(),
                name,
                progress
                    .states
                    .get(name)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown".to_owned()),
                stats.workers,
                rps.get(name).copied().unwrap_or_default(),
                stats.reqs,
                stats.fail_rate,
                stats.duration.avg,
            );
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        for report in &summary.reports {
            let stats = summary
                .snapshots
                .get(&report.scenario)
                .map(ScenarioStats::from_snapshot)
                .unwrap_or_default();
            println!(
                "done scenario={} executor={} elapsed={:.2}s reqs={} iterations={} rps={:.1} \
                 fail_rate={:.4} failed={} req_duration(avg={:.2}ms min={:.2}ms max={:.2}ms p90={:.2}ms p95={:.2}ms) \
                 workers_max={} dropped_arrivals={} spawn_failures={} worker_panics={} \
                 drained={} cancelled={}{}",
                report.scenario,
                report.kind,
                report.elapsed.as_secs_f64(),
                stats.reqs,
                stats.iterations,
                stats.throughput(report.elapsed),
                stats.fail_rate,
                stats.failed,
                stats.duration.avg,
                stats.duration.min,
                stats.duration.max,
                stats.duration.p90,
                stats.duration.p95,
                stats.workers_max,
                stats.dropped_arrivals,
                stats.spawn_failures,
                stats.worker_panics,
                report.drain.exited,
                report.drain.cancelled,
                if report.stopped_early {
                    " (stopped early)"
                } else {
                    ""
                },
            );
        }

        for failure in &summary.failures {
            println!(
                "failed scenario={} reason={}",
                failure.scenario, failure.reason
            );
        }

        if let [a, b] = summary.reports.as_slice() {
            let stats = |name: &ArcStr| {
                summary
                    .snapshots
                    .get(name)
                    .map(ScenarioStats::from_snapshot)
                    .unwrap_or_default()
            };
            let (sa, sb) = (stats(&a.scenario), stats(&b.scenario));
            println!(
                "compare {} vs {}: rps {:.1} vs {:.1}, avg {:.2}ms vs {:.2}ms, p95 {:.2}ms vs {:.2}ms, fail_rate {:.4} vs {:.4}",
                a.scenario,
                b.scenario,
                sa.throughput(a.elapsed),
                sb.throughput(b.elapsed),
                sa.duration.avg,
                sb.duration.avg,
                sa.duration.p95,
                sb.duration.p95,
                sa.fail_rate,
                sb.fail_rate,
            );
        }
    }
}
