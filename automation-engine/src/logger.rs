//! Logging Infrastructure
//!
//! Structured tracing setup. Subsystems log under their own targets
//! (`rules`, `sla`, `executor`, `audit`) so operators can filter with
//! `RUST_LOG=automation_engine::sla=debug` style directives.

use tracing_subscriber::EnvFilter;

/// Initialize the logger with an env-filter, defaulting to `info`.
///
/// Safe to call once per process; embedders that install their own
/// subscriber should skip this.
pub fn init_logger() {
    init_logger_with_level("info");
}

/// Initialize the logger with an explicit default level.
pub fn init_logger_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .init();
}

/// Test helper: install a subscriber if none is set, ignore otherwise.
pub fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
