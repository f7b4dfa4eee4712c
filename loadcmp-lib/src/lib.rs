#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod coordinator;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod scenario;
pub mod schedule;
pub mod utils;

#[cfg(test)]
mod test;
