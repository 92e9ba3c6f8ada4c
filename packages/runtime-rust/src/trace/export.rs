//! Span exporters: console pretty-printer and OTLP-style HTTP.

use async_trait::async_trait;
use pars_core::trace::hex_encode;
use serde_json::{json, Value};

use super::span::{SpanData, SpanStatus};

/// Sink for sealed spans. Export failures are reported to the caller so the
/// flush loop can requeue the batch; they never affect traced operations.
#[async_trait]
pub trait SpanExporter: Send + Sync {
    async fn export(&self, batch: &[SpanData]) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ConsoleExporter
// ---------------------------------------------------------------------------

/// Prints one human-readable line per span. Intended for development.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleExporter;

#[async_trait]
impl SpanExporter for ConsoleExporter {
    async fn export(&self, batch: &[SpanData]) -> anyhow::Result<()> {
        for span in batch {
            let status = match &span.status {
                SpanStatus::Unset => "unset".to_string(),
                SpanStatus::Ok => "ok".to_string(),
                SpanStatus::Error { message } => format!("error({message})"),
            };
            println!(
                "[trace {}] {} span={} parent={} {:?} {}ms {}",
                span.context.trace_id_hex(),
                span.name,
                span.context.span_id_hex(),
                span.parent_span_id.map_or_else(|| "-".to_string(), |id| hex_encode(&id)),
                span.kind,
                span.end_unix_ms - span.start_unix_ms,
                status,
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OtlpHttpExporter
// ---------------------------------------------------------------------------

/// Batched OTLP/HTTP JSON exporter: `POST {endpoint}/v1/traces`.
pub struct OtlpHttpExporter {
    endpoint: String,
    service_name: String,
    client: reqwest::Client,
}

impl OtlpHttpExporter {
    /// Creates an exporter targeting an OTLP/HTTP collector.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            service_name: service_name.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Builds the `resourceSpans` payload for one batch.
    #[must_use]
    pub fn payload(&self, batch: &[SpanData]) -> Value {
        let spans: Vec<Value> = batch.iter().map(otlp_span).collect();
        json!({
            "resourceSpans": [{
                "resource": {
                    "attributes": [{
                        "key": "service.name",
                        "value": { "stringValue": self.service_name }
                    }]
                },
                "scopeSpans": [{
                    "scope": { "name": "pars-runtime" },
                    "spans": spans
                }]
            }]
        })
    }
}

fn otlp_span(span: &SpanData) -> Value {
    let attributes: Vec<Value> = span
        .attributes
        .iter()
        .map(|(key, value)| {
            let string_value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({ "key": key, "value": { "stringValue": string_value } })
        })
        .collect();
    let events: Vec<Value> = span
        .events
        .iter()
        .map(|event| {
            json!({
                "name": event.name,
                "timeUnixNano": (event.time_unix_ms * 1_000_000).to_string(),
            })
        })
        .collect();
    let mut value = json!({
        "traceId": span.context.trace_id_hex(),
        "spanId": span.context.span_id_hex(),
        "name": span.name,
        "kind": span.kind.otlp_code(),
        "startTimeUnixNano": (span.start_unix_ms * 1_000_000).to_string(),
        "endTimeUnixNano": (span.end_unix_ms * 1_000_000).to_string(),
        "attributes": attributes,
        "events": events,
        "status": { "code": span.status.otlp_code() },
    });
    if let Some(parent) = span.parent_span_id {
        value["parentSpanId"] = Value::String(hex_encode(&parent));
    }
    if let SpanStatus::Error { message } = &span.status {
        value["status"]["message"] = Value::String(message.clone());
    }
    value
}

#[async_trait]
impl SpanExporter for OtlpHttpExporter {
    async fn export(&self, batch: &[SpanData]) -> anyhow::Result<()> {
        let payload = self.payload(batch);
        self.client
            .post(format!("{}/v1/traces", self.endpoint))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
