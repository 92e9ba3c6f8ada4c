//! Distributed tracing: spans, sampling, buffering, and export.
//!
//! Identifiers and the `traceparent` wire format live in
//! `pars_core::trace`; this module owns the runtime side -- the tracer's
//! context stack, span lifecycle, and the exporters.

pub mod export;
pub mod sampler;
pub mod span;
pub mod tracer;

pub use export::{ConsoleExporter, OtlpHttpExporter, SpanExporter};
pub use sampler::Sampler;
pub use span::{Span, SpanData, SpanEvent, SpanKind, SpanStatus};
pub use tracer::{Tracer, TracerConfig};
