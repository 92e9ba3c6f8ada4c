//! Resilience layer: circuit breaker + bulkhead around a transport.
//!
//! Gate order (outermost first): breaker, then bulkhead, then the wrapped
//! transport. The layer never inspects the request payload; it is a pure
//! call-outcome state machine keyed by the one target it guards.

pub mod breaker;
pub mod bulkhead;

use std::sync::Arc;

use async_trait::async_trait;
use pars_core::messages::rpc::{RpcRequest, RpcResponse};
use pars_core::RpcError;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use bulkhead::{Bulkhead, BulkheadConfig};

use crate::transport::Transport;

/// A transport wrapped with a circuit breaker and a bulkhead for one
/// logical target service.
pub struct ResilientTransport {
    inner: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    bulkhead: Bulkhead,
}

impl ResilientTransport {
    #[must_use]
    pub fn new(
        inner: Arc<dyn Transport>,
        breaker_config: CircuitBreakerConfig,
        bulkhead_config: &BulkheadConfig,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(breaker_config),
            bulkhead: Bulkhead::new(bulkhead_config),
        }
    }

    /// Breaker state for the guarded target, for observability.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[async_trait]
impl Transport for ResilientTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        self.breaker.try_acquire()?;
        let permit = match self.bulkhead.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                // The transport was never touched; a claimed half-open trial
                // slot must be handed back.
                self.breaker.cancel_acquire();
                return Err(err);
            }
        };

        let result = self.inner.call(request).await;
        match &result {
            Ok(response) if response.success => self.breaker.record_success(),
            Ok(_) | Err(_) => self.breaker.record_failure(),
        }
        drop(permit);
        result
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
