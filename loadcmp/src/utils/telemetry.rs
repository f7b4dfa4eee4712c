use std::io::IsTerminal as _;

use rama::{
    error::{BoxError, ErrorContext as _, ErrorExt as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

use crate::Args;

/// Crates logging on behalf of the harness itself.
const HARNESS_TARGETS: &[&str] = &["loadcmp", "loadcmp_lib"];

/// Per-target directives used when `RUST_LOG` is not set.
///
/// `--verbose` only raises the harness targets; `rama` internals stay at warn.
fn default_directives(verbose: bool) -> String {
    let harness_level = if verbose { "debug" } else { "info" };

    let mut directives = vec!["warn".to_owned()];
    directives.extend(
        HARNESS_TARGETS
            .iter()
            .map(|target| format!("{target}={harness_level}")),
    );
    directives.join(",")
}

/// Configures structured logging, overridable via the `RUST_LOG` environment variable.
pub fn init_tracing(args: &Args) -> Result<(), BoxError> {
    let make_writer = match args.output.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .context("open log file")
                .with_context_debug_field("path", || path.to_owned())?;

            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = EnvFilter::builder().with_default_directive(LevelFilter::WARN.into());
    let (env_filter, from_env) = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => (builder.parse_lossy(directives), true),
        _ => (builder.parse_lossy(default_directives(args.verbose)), false),
    };

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(args.output.is_none() && std::io::stderr().is_terminal())
        .with_env_filter(env_filter)
        .with_writer(make_writer);

    if args.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        filter_from_env = from_env,
        output = ?args.output,
        "tracing is set up",
    );
    Ok(())
}
