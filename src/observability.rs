//! Tracing bootstrap for binaries and examples embedding the engine.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber with an env-filter
/// (`RUST_LOG`, default `info`). Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
