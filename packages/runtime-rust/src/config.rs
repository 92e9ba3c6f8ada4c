//! Server-level configuration for RPC dispatch.

use std::collections::HashMap;
use std::time::Duration;

/// Configuration for an [`crate::rpc::server::RpcServer`].
///
/// Controls the default per-call timeout and per-method overrides.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default timeout for a dispatched call in milliseconds.
    pub default_timeout_ms: u64,
    /// Per-method timeout overrides in milliseconds, keyed by method name.
    pub method_timeouts_ms: HashMap<String, u64>,
}

impl ServerConfig {
    /// Timeout to apply for `method`: the override if present, else the default.
    #[must_use]
    pub fn timeout_for(&self, method: &str) -> Duration {
        let ms = self
            .method_timeouts_ms
            .get(method)
            .copied()
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            method_timeouts_ms: HashMap::new(),
        }
    }
}
