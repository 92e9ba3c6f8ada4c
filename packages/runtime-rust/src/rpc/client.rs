//! RPC client: builds requests, decorates them with trace context, and
//! calls through the resilience layer.
//!
//! The client does not retry; retry policy belongs to the caller, informed
//! by the typed error's `retryable`/`retry_after`. An error response from
//! the target is raised as the [`RpcError`] it encodes -- callers that want
//! to inspect raw responses can use a [`Transport`] directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pars_core::messages::rpc::{MethodKind, RpcRequest};
use pars_core::RpcError;
use serde_json::Value;
use uuid::Uuid;

use crate::resilience::{
    BulkheadConfig, CircuitBreakerConfig, CircuitState, ResilientTransport,
};
use crate::trace::{SpanKind, Tracer};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// Caller-side endpoint for one target service.
pub struct RpcClient {
    target: String,
    expected_version: Option<String>,
    transport: ResilientTransport,
    tracer: Option<Arc<Tracer>>,
    closed: AtomicBool,
}

impl RpcClient {
    /// Starts building a client for `target` over `transport`.
    #[must_use]
    pub fn builder(target: impl Into<String>, transport: Arc<dyn Transport>) -> RpcClientBuilder {
        RpcClientBuilder {
            target: target.into(),
            transport,
            expected_version: None,
            tracer: None,
            breaker: CircuitBreakerConfig::default(),
            bulkhead: BulkheadConfig::default(),
        }
    }

    /// Calls a query method.
    ///
    /// # Errors
    ///
    /// Any [`RpcError`]: local rejection (circuit, bulkhead), transport
    /// failure, or the typed error encoded in a failed response.
    pub async fn query(&self, method: &str, input: Value) -> Result<Value, RpcError> {
        self.call(MethodKind::Query, method, input).await
    }

    /// Calls a mutation method.
    ///
    /// # Errors
    ///
    /// See [`RpcClient::query`].
    pub async fn mutate(&self, method: &str, input: Value) -> Result<Value, RpcError> {
        self.call(MethodKind::Mutation, method, input).await
    }

    async fn call(&self, kind: MethodKind, method: &str, input: Value) -> Result<Value, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Transport("client is closed".into()));
        }
        let mut request = RpcRequest {
            id: Uuid::new_v4().to_string(),
            service: self.target.clone(),
            method: method.to_string(),
            kind,
            version: self.expected_version.clone(),
            input,
            metadata: HashMap::new(),
            trace_context: None,
            trace_state: None,
        };

        match &self.tracer {
            Some(tracer) => {
                let mut span = tracer
                    .start_span(format!("rpc.{}.{}", self.target, method), SpanKind::Client);
                span.set_attribute("rpc.service", Value::String(self.target.clone()));
                span.set_attribute("rpc.method", Value::String(method.to_string()));
                request.trace_context = Some(span.context().traceparent());
                request.trace_state = span.context().trace_state.clone();

                let result = self.dispatch(request).await;
                match &result {
                    Ok(_) => span.set_status_ok(),
                    Err(err) => span.record_error(&err.to_string()),
                }
                tracer.finish_span(span);
                result
            }
            None => self.dispatch(request).await,
        }
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<Value, RpcError> {
        let response = self.transport.call(request).await?;
        if response.success {
            Ok(response.output.unwrap_or(Value::Null))
        } else {
            Err(response
                .error
                .as_ref()
                .map(RpcError::from_body)
                .unwrap_or_else(|| {
                    RpcError::Internal("failed response without error body".into())
                }))
        }
    }

    /// Breaker state toward the target, for observability.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.transport.circuit_state()
    }

    /// Releases the underlying transport. Idempotent; calls after close
    /// fail with a transport error.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.close().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`RpcClient`].
pub struct RpcClientBuilder {
    target: String,
    transport: Arc<dyn Transport>,
    expected_version: Option<String>,
    tracer: Option<Arc<Tracer>>,
    breaker: CircuitBreakerConfig,
    bulkhead: BulkheadConfig,
}

impl RpcClientBuilder {
    /// Version stamped on every request for the server's version gate.
    #[must_use]
    pub fn expect_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    /// Attaches a tracer; every call then runs in a `client` span.
    #[must_use]
    pub fn tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    #[must_use]
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    #[must_use]
    pub fn bulkhead_config(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = config;
        self
    }

    #[must_use]
    pub fn build(self) -> RpcClient {
        RpcClient {
            target: self.target,
            expected_version: self.expected_version,
            transport: ResilientTransport::new(self.transport, self.breaker, &self.bulkhead),
            tracer: self.tracer,
            closed: AtomicBool::new(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pars_core::error::codes;
    use pars_core::ServiceDefinition;
    use semver::Version;
    use serde_json::json;

    use super::*;
    use crate::rpc::handler::handler_fn;
    use crate::rpc::server::RpcServer;
    use crate::trace::{ConsoleExporter, Sampler, SpanExporter, TracerConfig};
    use crate::transport::{EmbeddedRegistry, EmbeddedTransport};

    fn registry_with_echo() -> Arc<EmbeddedRegistry> {
        let definition = Arc::new(
            ServiceDefinition::builder("billing", Version::new(1, 4, 2)).query("echo").build(),
        );
        let server = Arc::new(
            RpcServer::builder(definition)
                .query("echo", handler_fn(|input, _ctx| async move { Ok(input) }))
                .build(),
        );
        let registry = Arc::new(EmbeddedRegistry::new());
        registry.register(server).unwrap();
        registry
    }

    fn client_for(registry: Arc<EmbeddedRegistry>) -> RpcClient {
        RpcClient::builder("billing", Arc::new(EmbeddedTransport::new(registry))).build()
    }

    #[tokio::test]
    async fn query_unwraps_the_output() {
        let client = client_for(registry_with_echo());
        let out = client.query("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[tokio::test]
    async fn failed_response_is_raised_as_typed_error() {
        let client = client_for(registry_with_echo());
        let err = client.query("missing", json!({})).await.unwrap_err();
        assert_eq!(err, RpcError::MethodNotFound("missing".into()));
    }

    #[tokio::test]
    async fn unregistered_target_fails_with_service_not_found() {
        let registry = Arc::new(EmbeddedRegistry::new());
        let client = client_for(registry);
        let err = client.query("getX", json!({})).await.unwrap_err();
        assert_eq!(err.code(), codes::SERVICE_NOT_FOUND);
    }

    #[tokio::test]
    async fn version_expectation_is_enforced_by_the_server() {
        let client = RpcClient::builder(
            "billing",
            Arc::new(EmbeddedTransport::new(registry_with_echo())),
        )
        .expect_version("2.0.0")
        .build();
        let err = client.query("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn calls_after_close_fail() {
        let client = client_for(registry_with_echo());
        client.close().await;
        client.close().await; // idempotent
        let err = client.query("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn circuit_state_is_observable() {
        let registry = Arc::new(EmbeddedRegistry::new()); // nothing registered
        let client = RpcClient::builder("billing", Arc::new(EmbeddedTransport::new(registry)))
            .breaker_config(CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(60),
            })
            .build();

        assert_eq!(client.circuit_state(), CircuitState::Closed);
        let _ = client.query("echo", json!({})).await;
        let _ = client.query("echo", json!({})).await;
        assert_eq!(client.circuit_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn traced_call_records_a_client_span() {
        use parking_lot::Mutex;

        #[derive(Default)]
        struct Capture(Mutex<Vec<crate::trace::SpanData>>);

        #[async_trait::async_trait]
        impl SpanExporter for Capture {
            async fn export(&self, batch: &[crate::trace::SpanData]) -> anyhow::Result<()> {
                self.0.lock().extend_from_slice(batch);
                Ok(())
            }
        }

        let exporter = Arc::new(Capture::default());
        let tracer = Tracer::new(
            TracerConfig { sampler: Sampler::Always, ..TracerConfig::default() },
            Arc::clone(&exporter) as Arc<dyn SpanExporter>,
        );

        let client = RpcClient::builder(
            "billing",
            Arc::new(EmbeddedTransport::new(registry_with_echo())),
        )
        .tracer(Arc::clone(&tracer))
        .build();

        client.query("echo", json!(1)).await.unwrap();
        tracer.flush().await;

        let spans = exporter.0.lock();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "rpc.billing.echo");
        assert_eq!(spans[0].kind, crate::trace::SpanKind::Client);
        assert_eq!(spans[0].status, crate::trace::SpanStatus::Ok);
        drop(spans);

        // The failure path mirrors into the span status.
        let _ = client.query("missing", json!(1)).await;
        tracer.flush().await;
        let spans = exporter.0.lock();
        assert!(matches!(spans[1].status, crate::trace::SpanStatus::Error { .. }));
    }

    #[tokio::test]
    async fn traced_call_propagates_traceparent_to_the_server() {
        let definition = Arc::new(
            ServiceDefinition::builder("billing", Version::new(1, 0, 0)).query("whoami").build(),
        );
        let server = Arc::new(
            RpcServer::builder(definition)
                .query(
                    "whoami",
                    handler_fn(|_input, ctx| async move {
                        Ok(json!({ "traced": ctx.trace_context.is_some() }))
                    }),
                )
                .build(),
        );
        let registry = Arc::new(EmbeddedRegistry::new());
        registry.register(server).unwrap();

        let tracer = Tracer::new(TracerConfig::default(), Arc::new(ConsoleExporter));
        let client = RpcClient::builder("billing", Arc::new(EmbeddedTransport::new(registry)))
            .tracer(tracer)
            .build();

        let out = client.query("whoami", json!({})).await.unwrap();
        assert_eq!(out, json!({ "traced": true }));
    }
}
