use std::{path::PathBuf, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    rt::Executor,
    telemetry::tracing,
};

use clap::Args;
use loadcmp_lib::{
    coordinator::RunCoordinator,
    executor::ExecutorSettings,
    http::{DEFAULT_REQUEST_TIMEOUT, HttpGetWorkload, new_web_client, target_uri},
    scenario::Scenario,
    utils::{env, time::parse_humantime_str},
};

use crate::config::{RunConfig, Shape};

pub mod reporter;

use self::reporter::*;

#[derive(Debug, Clone, Args)]
/// run the comparison load against both backends
pub struct RunCommand {
    /// address of the thread-pool backend
    #[arg(long, value_name = "ADDRESS", default_value = "127.0.0.1:7878")]
    pooled: String,

    /// address of the thread-per-connection backend
    #[arg(long, value_name = "ADDRESS", default_value = "127.0.0.1:7879")]
    spawning: String,

    /// traffic shape applied to both backends
    #[arg(long, value_enum, default_value_t = Shape::Ramping)]
    shape: Shape,

    /// JSON file describing all scenarios, replaces the built-in shape and addresses
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// pause at the end of every iteration (default: 100ms or the config value)
    #[arg(long, value_parser = parse_humantime_str)]
    pause: Option<Duration>,

    /// request timeout
    #[arg(long, value_parser = parse_humantime_str, default_value = "60s")]
    timeout: Duration,

    /// max time in-flight requests get to finish once a scenario stops
    #[arg(long, value_parser = parse_humantime_str, default_value = "30s")]
    drain: Duration,

    /// interval at which ramping schedules are re-evaluated
    #[arg(long, value_parser = parse_humantime_str, default_value = "100ms")]
    tick: Duration,

    /// upper bound of live workers per scenario (default: cpus * 1024, or MAX_WORKERS env)
    #[arg(long, value_name = "N")]
    worker_limit: Option<usize>,

    /// jitter applied to arrival spacing, in [0, 1]
    #[arg(long, default_value_t = 0.)]
    jitter: f64,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), BoxError> {
    let exec = Executor::graceful(guard.clone());

    let cfg = match args.config.as_deref() {
        Some(path) => RunConfig::load(path).await?,
        None => RunConfig::preset(args.shape, &args.pooled, &args.spawning),
    };
    let pause = args.pause.unwrap_or(cfg.pause);
    let timeout = if args.timeout.is_zero() {
        DEFAULT_REQUEST_TIMEOUT
    } else {
        args.timeout
    };

    let client = new_web_client(exec.clone()).context("create HTTP client")?;

    let mut scenarios = Vec::with_capacity(cfg.scenarios.len());
    for (name, scenario_cfg) in cfg.scenarios {
        let uri = target_uri(&scenario_cfg.target)
            .with_context_field("scenario", || name.clone())?;
        tracing::info!(
            scenario = %name,
            %uri,
            executor = scenario_cfg.schedule.executor_kind(),
            duration = ?scenario_cfg.schedule.total_duration(),
            "scenario ready",
        );
        let workload = HttpGetWorkload::new(client.clone(), uri).with_timeout(timeout);
        scenarios.push(Scenario::new(name, workload, scenario_cfg.schedule).with_pause(pause));
    }

    let settings = ExecutorSettings {
        tick: args.tick,
        drain_timeout: args.drain,
        worker_limit: Some(
            args.worker_limit
                .unwrap_or_else(env::compute_worker_limit),
        ),
        arrival_jitter: args.jitter.clamp(0.0, 1.0),
    };
    tracing::info!(?pause, ?timeout, ?settings, "run config parameters ready");

    let handle = RunCoordinator::new(exec)
        .with_settings(settings)
        .start(scenarios)
        .context("start scenarios")?;
    let probe = handle.probe();

    let mut reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonlReporter::new(REPORT_INTERVAL))
    } else {
        Box::new(HumanReporter::new(REPORT_INTERVAL))
    };

    let mut cancelled = std::pin::pin!(guard.clone_weak().into_cancelled());
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancelled.as_mut() => {
                tracing::warn!("stop run early: guard shutdown");
                handle.stop();
                break;
            }
            _ = ticker.tick() => {
                if probe.is_finished() {
                    tracing::debug!("all scenarios stopped");
                    break;
                }
                let states = probe.states();
                let snapshots = probe.collect();
                reporter.on_progress(&Progress {
                    elapsed: probe.elapsed(),
                    states: &states,
                    snapshots: &snapshots,
                });
            }
        }
    }

    let summary = handle.await_completion().await;
    reporter.finish(&summary);

    if summary.is_success() {
        Ok(())
    } else {
        Err(BoxError::from(format!(
            "{} scenario(s) did not complete",
            summary.failures.len()
        )))
    }
}
