//! Log subscriber setup for binaries and tests.

/// Environment variable holding the filter directives, e.g.
/// `TILESTORE_LOG=tilestore_engine=debug`.
pub const LOG_ENV: &str = "TILESTORE_LOG";

/// Installs a formatting subscriber filtered by [`LOG_ENV`] (default
/// `warn`). Returns false when a global subscriber was already set or the
/// `tracing` feature is off.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing() -> bool {
    false
}
