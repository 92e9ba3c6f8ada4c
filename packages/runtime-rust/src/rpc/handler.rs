//! Method handlers and the per-call server context.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use pars_core::messages::rpc::{MethodKind, RpcRequest};
use pars_core::trace::TraceContext;
use pars_core::RpcError;
use serde_json::Value;

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Context visible to middleware and handlers for one dispatched call.
///
/// Built once on entry to `handle` and shared read-only down the chain.
/// Request metadata is not snapshotted here: middleware-appended entries
/// travel on the request itself.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Name of the service handling the call.
    pub service: String,
    /// Method being invoked.
    pub method: String,
    /// Query or mutation.
    pub kind: MethodKind,
    /// Id of the request, echoed on the response.
    pub request_id: String,
    /// Incoming trace context, if the caller sent a well-formed one.
    pub trace_context: Option<TraceContext>,
}

impl CallContext {
    /// Derives the context from an incoming request.
    ///
    /// A malformed `traceparent` is treated as no incoming context.
    #[must_use]
    pub fn from_request(service: &str, request: &RpcRequest) -> Self {
        let trace_context = request.trace_context.as_deref().and_then(|tp| {
            TraceContext::parse_headers(tp, request.trace_state.as_deref())
        });
        Self {
            service: service.to_string(),
            method: request.method.clone(),
            kind: request.kind,
            request_id: request.id.clone(),
            trace_context,
        }
    }
}

// ---------------------------------------------------------------------------
// MethodHandler
// ---------------------------------------------------------------------------

/// Handler for a single query or mutation.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Executes the method against `input`.
    async fn invoke(&self, input: Value, ctx: &CallContext) -> Result<Value, RpcError>;
}

/// Wraps an async closure as a [`MethodHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MethodHandler>
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    async fn invoke(&self, input: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        (self.0)(input, ctx.clone()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
