use serde::{Deserialize, Serialize};

/// Per-call context carrying tenancy, correlation, and tracing information.
/// Threaded through RPC dispatch and event emission for audit and multi-tenant isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Tenant scope for multi-tenant isolation. `None` for single-tenant deployments.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tenant_id: Option<String>,
    /// Correlation id of the request that caused this work, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    /// Serialized W3C `traceparent` header for distributed tracing.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_context: Option<String>,
    /// Serialized W3C `tracestate` header, carried alongside `trace_context`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_state: Option<String>,
}
