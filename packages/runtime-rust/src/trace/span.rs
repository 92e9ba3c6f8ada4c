//! Spans: timed units of work linked into a trace.

use std::collections::BTreeMap;
use std::time::Instant;

use pars_core::trace::TraceContext;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Role of the span within a call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// OTLP wire code for this kind.
    #[must_use]
    pub fn otlp_code(self) -> u32 {
        match self {
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
            SpanKind::Producer => 4,
            SpanKind::Consumer => 5,
        }
    }
}

/// Final status of a sealed span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error { message: String },
}

impl SpanStatus {
    /// OTLP wire code for this status.
    #[must_use]
    pub fn otlp_code(&self) -> u32 {
        match self {
            SpanStatus::Unset => 0,
            SpanStatus::Ok => 1,
            SpanStatus::Error { .. } => 2,
        }
    }
}

/// Point-in-time annotation on a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_ms: i64,
}

// ---------------------------------------------------------------------------
// SpanData
// ---------------------------------------------------------------------------

/// Sealed, immutable record of a completed span, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    pub context: TraceContext,
    pub parent_span_id: Option<[u8; 8]>,
    pub name: String,
    pub kind: SpanKind,
    /// Wall-clock start, millisecond resolution.
    pub start_unix_ms: i64,
    /// Start plus the monotonically measured duration.
    pub end_unix_ms: i64,
    pub attributes: BTreeMap<String, Value>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
}

// ---------------------------------------------------------------------------
// Span (active)
// ---------------------------------------------------------------------------

/// A span that is still open. Created by the tracer on entry to a traced
/// operation and sealed into [`SpanData`] on completion.
#[derive(Debug)]
pub struct Span {
    data: SpanData,
    started: Instant,
    recorded: bool,
}

impl Span {
    pub(crate) fn new(
        context: TraceContext,
        parent_span_id: Option<[u8; 8]>,
        name: String,
        kind: SpanKind,
        start_unix_ms: i64,
        recorded: bool,
    ) -> Self {
        Self {
            data: SpanData {
                context,
                parent_span_id,
                name,
                kind,
                start_unix_ms,
                end_unix_ms: start_unix_ms,
                attributes: BTreeMap::new(),
                events: Vec::new(),
                status: SpanStatus::Unset,
            },
            started: Instant::now(),
            recorded,
        }
    }

    /// Trace context of this span (its own span id, the shared trace id).
    #[must_use]
    pub fn context(&self) -> &TraceContext {
        &self.data.context
    }

    /// Whether this span will be buffered for export when sealed.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.data.attributes.insert(key.into(), value);
    }

    /// Records a point-in-time event at the current offset into the span.
    pub fn add_event(&mut self, name: impl Into<String>) {
        #[allow(clippy::cast_possible_wrap)]
        let time_unix_ms = self.data.start_unix_ms + self.started.elapsed().as_millis() as i64;
        self.data.events.push(SpanEvent { name: name.into(), time_unix_ms });
    }

    pub fn set_status_ok(&mut self) {
        self.data.status = SpanStatus::Ok;
    }

    /// Marks the span failed, recording the exception as an event.
    pub fn record_error(&mut self, message: &str) {
        self.add_event(format!("exception: {message}"));
        self.data.status = SpanStatus::Error { message: message.to_string() };
    }

    /// Seals the span: stamps the end time and returns the immutable record.
    pub(crate) fn seal(mut self) -> (SpanData, bool) {
        #[allow(clippy::cast_possible_wrap)]
        let elapsed_ms = self.started.elapsed().as_millis() as i64;
        self.data.end_unix_ms = self.data.start_unix_ms + elapsed_ms;
        (self.data, self.recorded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> TraceContext {
        TraceContext {
            trace_id: [1; 16],
            span_id: [2; 8],
            trace_flags: TraceContext::FLAG_SAMPLED,
            trace_state: None,
        }
    }

    #[test]
    fn seal_produces_monotonic_end_time() {
        let span = Span::new(context(), None, "op".into(), SpanKind::Internal, 1_000, true);
        let (data, recorded) = span.seal();
        assert!(recorded);
        assert!(data.end_unix_ms >= data.start_unix_ms);
        assert_eq!(data.status, SpanStatus::Unset);
    }

    #[test]
    fn record_error_sets_status_and_event() {
        let mut span = Span::new(context(), None, "op".into(), SpanKind::Client, 1_000, true);
        span.record_error("boom");
        let (data, _) = span.seal();
        assert_eq!(data.status, SpanStatus::Error { message: "boom".into() });
        assert_eq!(data.events.len(), 1);
        assert!(data.events[0].name.contains("boom"));
    }

    #[test]
    fn attributes_accumulate() {
        let mut span = Span::new(context(), None, "op".into(), SpanKind::Server, 0, true);
        span.set_attribute("rpc.method", json!("getInvoice"));
        span.set_attribute("rpc.service", json!("billing"));
        let (data, _) = span.seal();
        assert_eq!(data.attributes.len(), 2);
    }

    #[test]
    fn kind_and_status_otlp_codes() {
        assert_eq!(SpanKind::Internal.otlp_code(), 1);
        assert_eq!(SpanKind::Consumer.otlp_code(), 5);
        assert_eq!(SpanStatus::Unset.otlp_code(), 0);
        assert_eq!(SpanStatus::Ok.otlp_code(), 1);
        assert_eq!(SpanStatus::Error { message: String::new() }.otlp_code(), 2);
    }
}
