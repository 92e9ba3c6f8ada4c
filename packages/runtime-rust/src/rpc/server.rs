//! Server-side dispatch: the single `handle(request) -> response` point.
//!
//! Dispatch order: version gate, handler resolution, deprecation warning,
//! middleware chain, timeout race, error normalization. `handle` never
//! panics past its boundary and never returns an error: every failure is
//! encoded in the response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use pars_core::messages::rpc::{MethodKind, RpcRequest, RpcResponse};
use pars_core::{RpcError, ServiceDefinition};
use serde_json::Value;
use tracing::{info, warn};

use super::handler::{CallContext, MethodHandler};
use super::middleware::{Middleware, Next};
use crate::config::ServerConfig;

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// Binds a service definition's handlers to incoming requests.
pub struct RpcServer {
    definition: Arc<ServiceDefinition>,
    config: ServerConfig,
    middleware: Arc<[Arc<dyn Middleware>]>,
    handlers: HashMap<(MethodKind, String), Arc<dyn MethodHandler>>,
}

impl RpcServer {
    /// Starts building a server for `definition`.
    #[must_use]
    pub fn builder(definition: Arc<ServiceDefinition>) -> RpcServerBuilder {
        RpcServerBuilder {
            definition,
            config: ServerConfig::default(),
            middleware: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Name of the service this server hosts.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.definition.name()
    }

    /// Serving version, as stamped on every response.
    #[must_use]
    pub fn version(&self) -> String {
        self.definition.version().to_string()
    }

    /// Handles one request. Never throws past this point: all failures are
    /// normalized into the response's error body.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let started = Instant::now();
        let id = request.id.clone();
        let method = request.method.clone();
        let version = self.version();

        let result = self.dispatch(request).await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(output) => {
                info!(
                    service = self.definition.name(),
                    method = %method,
                    duration_ms,
                    outcome = "ok",
                    "rpc call handled"
                );
                RpcResponse::ok(id, version, output)
            }
            Err(err) => {
                info!(
                    service = self.definition.name(),
                    method = %method,
                    duration_ms,
                    outcome = "error",
                    code = err.code(),
                    "rpc call handled"
                );
                RpcResponse::err(id, version, err.to_body())
            }
        }
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<Value, RpcError> {
        // 1. Version gate. Requests without a version always pass.
        if let Some(requested) = &request.version {
            if !self.definition.satisfies_version(requested) {
                return Err(RpcError::VersionMismatch {
                    requested: requested.clone(),
                    serving: self.version(),
                });
            }
        }

        // 2. Handler resolution for (method, kind).
        let handler = self
            .handlers
            .get(&(request.kind, request.method.clone()))
            .cloned()
            .ok_or_else(|| RpcError::MethodNotFound(request.method.clone()))?;

        // 3. Deprecation is non-fatal; warn and keep serving.
        if let Some(spec) = self.definition.method(&request.method) {
            if let Some(dep) = &spec.deprecation {
                warn!(
                    service = self.definition.name(),
                    method = %request.method,
                    reason = %dep.reason,
                    replacement = dep.replacement.as_deref().unwrap_or("none"),
                    "deprecated method invoked"
                );
            }
        }

        // 4-5. Middleware chain raced against the per-method timeout. The
        // losing branch is abandoned; its eventual completion is discarded.
        let ctx = Arc::new(CallContext::from_request(self.definition.name(), &request));
        let timeout = self.config.timeout_for(&request.method);
        let next = Next::entry(Arc::clone(&self.middleware), handler, ctx);
        match tokio::time::timeout(timeout, next.run(request)).await {
            Ok(result) => result,
            #[allow(clippy::cast_possible_truncation)]
            Err(_elapsed) => Err(RpcError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`RpcServer`].
pub struct RpcServerBuilder {
    definition: Arc<ServiceDefinition>,
    config: ServerConfig,
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: HashMap<(MethodKind, String), Arc<dyn MethodHandler>>,
}

impl RpcServerBuilder {
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a middleware; execution order is registration order.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers the handler for a query method.
    #[must_use]
    pub fn query(mut self, method: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Self {
        self.handlers.insert((MethodKind::Query, method.into()), handler);
        self
    }

    /// Registers the handler for a mutation method.
    #[must_use]
    pub fn mutation(mut self, method: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Self {
        self.handlers.insert((MethodKind::Mutation, method.into()), handler);
        self
    }

    #[must_use]
    pub fn build(self) -> RpcServer {
        RpcServer {
            definition: self.definition,
            config: self.config,
            middleware: Arc::from(self.middleware.into_boxed_slice()),
            handlers: self.handlers,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
