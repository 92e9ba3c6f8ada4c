//! RPC request/response envelopes.
//!
//! A request is created once per call and never mutated after dispatch,
//! except by server middleware appending metadata before handler execution.
//! A response is terminal and carries exactly one of `output` or `error`;
//! the [`RpcResponse::ok`] / [`RpcResponse::err`] constructors enforce that
//! invariant.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// MethodKind
// ---------------------------------------------------------------------------

/// Whether a method is a read (`query`) or a write (`mutation`).
///
/// Serialized lowercase as the `type` field of the request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Query,
    Mutation,
}

impl MethodKind {
    /// Wire string for this kind, as carried in the `X-Method-Type` header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MethodKind::Query => "query",
            MethodKind::Mutation => "mutation",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RpcRequest
// ---------------------------------------------------------------------------

/// A single RPC call envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Unique id for this call; echoed back on the response.
    pub id: String,
    /// Target service name.
    pub service: String,
    /// Method name within the target service.
    pub method: String,
    /// Query or mutation.
    #[serde(rename = "type")]
    pub kind: MethodKind,
    /// Service version the caller expects, checked by the server's version gate.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
    /// Method input payload.
    pub input: Value,
    /// Free-form key/value metadata; middleware may append entries.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, String>,
    /// W3C `traceparent` header value, when the caller is traced.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_context: Option<String>,
    /// W3C `tracestate` header value.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_state: Option<String>,
}

// ---------------------------------------------------------------------------
// ErrorBody
// ---------------------------------------------------------------------------

/// Structured error carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `"METHOD_NOT_FOUND"`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether the caller may reasonably retry the call.
    pub retryable: bool,
    /// Structured variant-specific payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<Value>,
    /// Suggested delay in seconds before retrying, for rejection-class errors.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after: Option<u64>,
}

// ---------------------------------------------------------------------------
// RpcResponse
// ---------------------------------------------------------------------------

/// Terminal response for an RPC call. `id` always equals the request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub id: String,
    pub success: bool,
    /// Actual version of the responding service.
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
}

impl RpcResponse {
    /// Builds a successful response carrying `output`.
    #[must_use]
    pub fn ok(id: impl Into<String>, version: impl Into<String>, output: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            version: version.into(),
            output: Some(output),
            error: None,
        }
    }

    /// Builds a failed response carrying `error`.
    #[must_use]
    pub fn err(id: impl Into<String>, version: impl Into<String>, error: ErrorBody) -> Self {
        Self {
            id: id.into(),
            success: false,
            version: version.into(),
            output: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
