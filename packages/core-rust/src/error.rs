//! Error taxonomy for RPC calls.
//!
//! Every variant carries a machine-readable code, an HTTP-style status code,
//! and a retryability flag. The server encodes errors into the response's
//! [`ErrorBody`]; the client reconstructs the typed error from that body.

use serde_json::{json, Value};
use thiserror::Error;

use crate::messages::rpc::ErrorBody;

/// Error codes as carried on the wire.
pub mod codes {
    pub const SERVICE_NOT_FOUND: &str = "SERVICE_NOT_FOUND";
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    pub const VERSION_MISMATCH: &str = "VERSION_MISMATCH";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";
    pub const BULKHEAD_REJECTED: &str = "BULKHEAD_REJECTED";
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Maps a wire error code to the HTTP status used by the HTTP transport.
///
/// Unknown (application-defined) codes map to 500.
#[must_use]
pub fn status_for_code(code: &str) -> u16 {
    match code {
        codes::SERVICE_NOT_FOUND | codes::METHOD_NOT_FOUND => 404,
        codes::VERSION_MISMATCH | codes::SERIALIZATION_ERROR | codes::VALIDATION_ERROR => 400,
        codes::UNAUTHENTICATED => 401,
        codes::FORBIDDEN => 403,
        codes::TIMEOUT => 504,
        codes::CIRCUIT_OPEN | codes::BULKHEAD_REJECTED => 503,
        _ => 500,
    }
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Typed failure for an RPC call, on either side of the wire.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    /// No server is registered or reachable under the requested service name.
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    /// The service exists but does not expose the requested method/kind pair.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// The caller's expected version is not satisfied by the serving version.
    #[error("version mismatch: requested {requested}, serving {serving}")]
    VersionMismatch { requested: String, serving: String },
    /// The call did not complete within its timeout.
    #[error("call timed out after {0}ms")]
    Timeout(u64),
    /// The circuit breaker for the target is open; retry after the cooldown.
    #[error("circuit open, retry in {0}s")]
    CircuitOpen(u64),
    /// The bulkhead for the target is at capacity.
    #[error("bulkhead at capacity, retry in {0}s")]
    BulkheadRejected(u64),
    /// Network-level failure between caller and target.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),
    /// The caller is not authenticated.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The caller is authenticated but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The input failed validation.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Domain error raised by a handler, forwarded verbatim.
    #[error("{message}")]
    Application {
        code: String,
        message: String,
        retryable: bool,
        details: Option<Value>,
    },
    /// Unclassified server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            RpcError::ServiceNotFound(_) => codes::SERVICE_NOT_FOUND,
            RpcError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            RpcError::VersionMismatch { .. } => codes::VERSION_MISMATCH,
            RpcError::Timeout(_) => codes::TIMEOUT,
            RpcError::CircuitOpen(_) => codes::CIRCUIT_OPEN,
            RpcError::BulkheadRejected(_) => codes::BULKHEAD_REJECTED,
            RpcError::Transport(_) => codes::TRANSPORT_ERROR,
            RpcError::Serialization(_) => codes::SERIALIZATION_ERROR,
            RpcError::Unauthenticated(_) => codes::UNAUTHENTICATED,
            RpcError::Forbidden(_) => codes::FORBIDDEN,
            RpcError::Validation(_) => codes::VALIDATION_ERROR,
            RpcError::Application { code, .. } => code,
            RpcError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// HTTP-style status code used by the HTTP transport.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        status_for_code(self.code())
    }

    /// Whether the caller may reasonably retry the call.
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            RpcError::Timeout(_)
            | RpcError::CircuitOpen(_)
            | RpcError::BulkheadRejected(_)
            | RpcError::Transport(_) => true,
            RpcError::Application { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Suggested retry delay in seconds, for rejection-class errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            RpcError::CircuitOpen(secs) | RpcError::BulkheadRejected(secs) => Some(*secs),
            _ => None,
        }
    }

    /// Encodes this error into the wire body carried by a failed response.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            RpcError::ServiceNotFound(service) => Some(json!({ "service": service })),
            RpcError::MethodNotFound(method) => Some(json!({ "method": method })),
            RpcError::VersionMismatch { requested, serving } => {
                Some(json!({ "requested": requested, "serving": serving }))
            }
            RpcError::Timeout(ms) => Some(json!({ "timeoutMs": ms })),
            RpcError::Application { details, .. } => details.clone(),
            _ => None,
        };
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.retryable(),
            details,
            retry_after: self.retry_after(),
        }
    }

    /// Reconstructs the typed error from a wire body.
    ///
    /// Variant fields travel in `details` where the message alone would be
    /// lossy; codes minted by application handlers come back as
    /// [`RpcError::Application`].
    #[must_use]
    pub fn from_body(body: &ErrorBody) -> Self {
        let detail_str = |key: &str| -> Option<String> {
            body.details
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match body.code.as_str() {
            codes::SERVICE_NOT_FOUND => {
                RpcError::ServiceNotFound(detail_str("service").unwrap_or_else(|| body.message.clone()))
            }
            codes::METHOD_NOT_FOUND => {
                RpcError::MethodNotFound(detail_str("method").unwrap_or_else(|| body.message.clone()))
            }
            codes::VERSION_MISMATCH => RpcError::VersionMismatch {
                requested: detail_str("requested").unwrap_or_default(),
                serving: detail_str("serving").unwrap_or_default(),
            },
            codes::TIMEOUT => RpcError::Timeout(
                body.details
                    .as_ref()
                    .and_then(|d| d.get("timeoutMs"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            ),
            codes::CIRCUIT_OPEN => RpcError::CircuitOpen(body.retry_after.unwrap_or(0)),
            codes::BULKHEAD_REJECTED => RpcError::BulkheadRejected(body.retry_after.unwrap_or(1)),
            codes::TRANSPORT_ERROR => RpcError::Transport(body.message.clone()),
            codes::SERIALIZATION_ERROR => RpcError::Serialization(body.message.clone()),
            codes::UNAUTHENTICATED => RpcError::Unauthenticated(body.message.clone()),
            codes::FORBIDDEN => RpcError::Forbidden(body.message.clone()),
            codes::VALIDATION_ERROR => RpcError::Validation(body.message.clone()),
            codes::INTERNAL_ERROR => RpcError::Internal(body.message.clone()),
            other => RpcError::Application {
                code: other.to_string(),
                message: body.message.clone(),
                retryable: body.retryable,
                details: body.details.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
