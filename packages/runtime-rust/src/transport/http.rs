//! HTTP transport: serialized envelopes over `POST {base}/rpc`.
//!
//! The client side POSTs a JSON-encoded request with identifying headers and
//! a request-scoped timeout. The server side is an axum router that feeds
//! the body through [`RpcServer::handle`] and derives the HTTP status from
//! the response's error code (`success: true` is always 200).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pars_core::error::{codes, status_for_code};
use pars_core::messages::rpc::{RpcRequest, RpcResponse};
use pars_core::{ErrorBody, RpcError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::Transport;
use crate::rpc::server::RpcServer;

/// Wire headers carried alongside the envelope.
pub mod headers {
    pub const REQUEST_ID: &str = "x-request-id";
    pub const SERVICE: &str = "x-service";
    pub const METHOD: &str = "x-method";
    pub const METHOD_TYPE: &str = "x-method-type";
    pub const SERVICE_VERSION: &str = "x-service-version";
    pub const TRACEPARENT: &str = "traceparent";
    pub const TRACESTATE: &str = "tracestate";
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Request-scoped timeout applied to every call.
    pub timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30) }
    }
}

/// Transport that serializes calls over HTTP POST.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Creates a transport for the given base URL (no trailing slash needed).
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: HttpTransportConfig) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client: reqwest::Client::new(), config }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        let body = serde_json::to_vec(&request)
            .map_err(|e| RpcError::Serialization(e.to_string()))?;

        let mut builder = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json")
            .header(headers::REQUEST_ID, &request.id)
            .header(headers::SERVICE, &request.service)
            .header(headers::METHOD, &request.method)
            .header(headers::METHOD_TYPE, request.kind.as_str())
            .timeout(self.config.timeout)
            .body(body);
        if let Some(version) = &request.version {
            builder = builder.header(headers::SERVICE_VERSION, version);
        }
        if let Some(traceparent) = &request.trace_context {
            builder = builder.header(headers::TRACEPARENT, traceparent);
        }
        if let Some(tracestate) = &request.trace_state {
            builder = builder.header(headers::TRACESTATE, tracestate);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                #[allow(clippy::cast_possible_truncation)]
                RpcError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                RpcError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        // A server-side failure still arrives as a well-formed response body.
        // An unparseable body on a success status is a payload problem; on an
        // error status it means the hop itself failed (proxy page, etc.).
        serde_json::from_slice::<RpcResponse>(&bytes).map_err(|e| {
            if status.is_success() {
                RpcError::Serialization(e.to_string())
            } else {
                RpcError::Transport(format!("http status {status}: unparseable body"))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Builds the axum router exposing `POST /rpc` for `server`.
#[must_use]
pub fn rpc_router(server: Arc<RpcServer>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn rpc_handler(
    State(server): State<Arc<RpcServer>>,
    header_map: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let id = header_map
                .get(headers::REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let error = ErrorBody {
                code: codes::SERIALIZATION_ERROR.to_string(),
                message: format!("serialization failure: {e}"),
                retryable: false,
                details: None,
                retry_after: None,
            };
            let response = RpcResponse::err(id, server.version(), error);
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    // Trace context may travel in headers only; merge it into the envelope.
    if request.trace_context.is_none() {
        if let Some(tp) = header_value(&header_map, headers::TRACEPARENT) {
            request.trace_context = Some(tp);
            request.trace_state = header_value(&header_map, headers::TRACESTATE);
        }
    }

    let response = server.handle(request).await;
    let status = response
        .error
        .as_ref()
        .map_or(StatusCode::OK, |e| {
            StatusCode::from_u16(status_for_code(&e.code))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        });
    (status, Json(response)).into_response()
}

fn header_value(header_map: &HeaderMap, name: &str) -> Option<String> {
    header_map.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// HTTP server lifecycle with deferred startup: `new()` allocates, `bind()`
/// claims the port, `serve()` accepts until the process ends.
pub struct RpcHttpServer {
    server: Arc<RpcServer>,
    listener: Option<TcpListener>,
}

impl RpcHttpServer {
    #[must_use]
    pub fn new(server: Arc<RpcServer>) -> Self {
        Self { server, listener: None }
    }

    /// Binds the TCP listener and returns the local address (useful when
    /// binding port 0).
    ///
    /// # Errors
    ///
    /// Returns the bind error from the OS.
    pub async fn bind(&mut self, addr: &str) -> std::io::Result<std::net::SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(service = self.server.service_name(), %local, "rpc http server bound");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Serves requests on the bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if called before `bind()` or if accepting fails.
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = self.listener.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "serve() called before bind()")
        })?;
        axum::serve(listener, rpc_router(self.server)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
