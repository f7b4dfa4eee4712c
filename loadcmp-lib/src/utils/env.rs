pub const fn project_name() -> &'static str {
    "loadcmp"
}

pub const fn user_agent() -> &'static str {
    concat!("loadcmp/", env!("CARGO_PKG_VERSION"))
}

/// Upper bound of live workers a ramping scenario may spawn.
///
/// Can be overwritten using the `MAX_WORKERS` environment variable.
pub fn compute_worker_limit() -> usize {
    std::env::var("MAX_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cpus * 1024
        })
}
