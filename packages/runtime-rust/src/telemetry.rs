//! Process-wide logging bootstrap.
//!
//! Installs an env-filtered `fmt` subscriber. Call once at process start;
//! repeated calls are no-ops so embedding hosts and tests can both call it.

use tracing_subscriber::EnvFilter;

/// Initializes logging with `RUST_LOG` if set, else `info`.
pub fn init() {
    init_with_default("info");
}

/// Initializes logging with `RUST_LOG` if set, else the given directive.
pub fn init_with_default(directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
