//! Transport over a host-provided channel.
//!
//! Some platforms co-locate "remote" services and expose a function-like
//! channel to them (a service binding) instead of a network address. This
//! transport carries the same envelope as the HTTP transport through such a
//! channel, without the network hop.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use pars_core::messages::rpc::{RpcRequest, RpcResponse};
use pars_core::RpcError;

use super::Transport;

/// Boxed future returned by a binding channel.
pub type BindingFuture = BoxFuture<'static, Result<RpcResponse, RpcError>>;

/// The host-provided channel: one async function from request to response.
pub type BindingFn = dyn Fn(RpcRequest) -> BindingFuture + Send + Sync;

/// Transport that forwards every call to an injected channel function.
pub struct BindingTransport {
    channel: Arc<BindingFn>,
}

impl BindingTransport {
    #[must_use]
    pub fn new(channel: Arc<BindingFn>) -> Self {
        Self { channel }
    }

    /// Wraps a plain async function as a binding transport.
    #[must_use]
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RpcResponse, RpcError>> + Send + 'static,
    {
        Self { channel: Arc::new(move |request| Box::pin(f(request)) as BindingFuture) }
    }
}

#[async_trait]
impl Transport for BindingTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        (self.channel)(request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
