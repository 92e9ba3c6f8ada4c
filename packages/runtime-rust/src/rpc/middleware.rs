//! Middleware chain with an explicit continuation.
//!
//! The chain is an ordered list of middleware, each receiving the request,
//! the call context, and a [`Next`] continuation capturing the remainder of
//! the chain (ending in the method handler). `Next::run` consumes the
//! continuation, so a middleware cannot invoke it twice; a middleware that
//! returns without invoking it at all is a programming error, and the chain
//! replaces its result with an internal error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pars_core::messages::rpc::RpcRequest;
use pars_core::RpcError;
use serde_json::Value;

use super::handler::{CallContext, MethodHandler};

// ---------------------------------------------------------------------------
// Middleware trait
// ---------------------------------------------------------------------------

/// A link in the server's dispatch chain.
///
/// Implementations may mutate the request (e.g. append metadata) before
/// passing it to `next.run(request)`, and may inspect or map the result on
/// the way back out. Every implementation must run `next` exactly once.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: RpcRequest,
        ctx: &CallContext,
        next: Next,
    ) -> Result<Value, RpcError>;
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// Continuation over the remaining chain, ending in the method handler.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    handler: Arc<dyn MethodHandler>,
    ctx: Arc<CallContext>,
    invoked: Arc<AtomicBool>,
}

impl Next {
    /// Entry continuation covering the whole chain.
    pub(crate) fn entry(
        chain: Arc<[Arc<dyn Middleware>]>,
        handler: Arc<dyn MethodHandler>,
        ctx: Arc<CallContext>,
    ) -> Self {
        Self {
            chain,
            index: 0,
            handler,
            ctx,
            invoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the rest of the chain with `request`.
    ///
    /// Consumes the continuation: it can only ever run once.
    pub async fn run(self, request: RpcRequest) -> Result<Value, RpcError> {
        self.invoked.store(true, Ordering::Release);

        let Some(middleware) = self.chain.get(self.index).cloned() else {
            return self.handler.invoke(request.input, &self.ctx).await;
        };

        let invoked = Arc::new(AtomicBool::new(false));
        let next = Next {
            chain: Arc::clone(&self.chain),
            index: self.index + 1,
            handler: Arc::clone(&self.handler),
            ctx: Arc::clone(&self.ctx),
            invoked: Arc::clone(&invoked),
        };
        let position = self.index;
        let result = middleware.handle(request, &self.ctx, next).await;
        if invoked.load(Ordering::Acquire) {
            result
        } else {
            Err(RpcError::Internal(format!(
                "middleware at position {position} returned without invoking next"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
