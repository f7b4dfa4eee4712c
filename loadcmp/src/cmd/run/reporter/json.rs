use loadcmp_lib::{coordinator::RunSummary, executor::ExecutorReport};

use super::{IntervalRps, Progress, Reporter, ScenarioStats};

pub struct JsonlReporter {
    interval: std::time::Duration,
    last_tick: std::time::Duration,
    rps: IntervalRps,
}

impl JsonlReporter {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            last_tick: std::time::Duration::ZERO,
            rps: IntervalRps::default(),
        }
    }
}

fn stats_json(stats: &ScenarioStats) -> serde_json::Value {
    serde_json::json!({
        "reqs": stats.reqs,
        "iterations": stats.iterations,
        "fail_rate": stats.fail_rate,
        "failed": stats.failed,
        "req_duration_ms": {
            "count": stats.duration.count,
            "avg": stats.duration.avg,
            "min": stats.duration.min,
            "max": stats.duration.max,
            "p50": stats.duration.p50,
            "p90": stats.duration.p90,
            "p95": stats.duration.p95,
            "p99": stats.duration.p99,
        },
        "workers": stats.workers,
        "workers_max": stats.workers_max,
        "dropped_arrivals": stats.dropped_arrivals,
        "spawn_failures": stats.spawn_failures,
        "worker_panics": stats.worker_panics,
    })
}

fn scenario_line(report: &ExecutorReport, stats: &ScenarioStats) -> serde_json::Value {
    serde_json::json!({
        "type": "scenario",
        "scenario": report.scenario.as_str(),
        "executor": report.kind,
        "elapsed_ms": report.elapsed.as_millis(),
        "rps": stats.throughput(report.elapsed),
        "stopped_early": report.stopped_early,
        "stage_workers": report.stage_workers,
        "arrivals": report.arrivals,
        "drain": {
            "exited": report.drain.exited,
            "cancelled": report.drain.cancelled,
        },
        "metrics": stats_json(stats),
    })
}

impl Reporter for JsonlReporter {
    fn on_progress(&mut self, progress: &Progress<'_>) {
        if progress.elapsed.saturating_sub(self.last_tick) < self.interval {
            return;
        }
        self.last_tick = progress.elapsed;

        let rps = self.rps.update(progress);
        for (name, snapshot) in progress.snapshots {
            let line = serde_json::json!({
                "type": "progress",
                "t_ms": progress.elapsed.as_millis(),
                "scenario": name.as_str(),
                "state": progress.states.get(name).map(ToString::to_string),
                "interval_ms": self.interval.as_millis(),
                "rps": rps.get(name).copied().unwrap_or_default(),
                "metrics": stats_json(&ScenarioStats::from_snapshot(snapshot)),
            });
            println!("{}", line);
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        for report in &summary.reports {
            let stats = summary
                .snapshots
                .get(&report.scenario)
                .map(ScenarioStats::from_snapshot)
                .unwrap_or_default();
            println!("{}", scenario_line(report, &stats));
        }

        let line = serde_json::json!({
            "type": "final",
            "elapsed_ms": summary.elapsed.as_millis(),
            "success": summary.is_success(),
            "failures": summary
                .failures
                .iter()
                .map(|failure| serde_json::json!({
                    "scenario": failure.scenario.as_str(),
                    "reason": failure.reason,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", line);
    }
}
