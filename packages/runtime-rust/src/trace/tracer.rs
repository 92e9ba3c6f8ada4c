//! The tracer: context stack, span lifecycle, and the buffered flush loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use pars_core::trace::TraceContext;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

use super::export::SpanExporter;
use super::sampler::Sampler;
use super::span::{Span, SpanData, SpanKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for [`Tracer`].
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Reported as the `service.name` resource attribute by exporters.
    pub service_name: String,
    /// Root-span sampling policy.
    pub sampler: Sampler,
    /// Interval between background flushes.
    pub flush_interval: Duration,
    /// Maximum spans per export batch; reaching it triggers an early flush.
    pub max_batch_size: usize,
    /// Buffer cap; beyond it the oldest span is dropped.
    pub max_buffer_size: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            service_name: "pars".into(),
            sampler: Sampler::Always,
            flush_interval: Duration::from_secs(5),
            max_batch_size: 512,
            max_buffer_size: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Records spans and exports them in batches.
///
/// The context stack supports nested scopes within one logical task; it is
/// not shared across tasks -- propagate explicitly (e.g. via `traceparent`)
/// when crossing a spawn or process boundary.
pub struct Tracer {
    config: TracerConfig,
    exporter: Arc<dyn SpanExporter>,
    stack: Mutex<Vec<TraceContext>>,
    buffer: Mutex<VecDeque<SpanData>>,
    flush_signal: Notify,
    shutdown_tx: watch::Sender<bool>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Tracer {
    #[must_use]
    pub fn new(config: TracerConfig, exporter: Arc<dyn SpanExporter>) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            exporter,
            stack: Mutex::new(Vec::new()),
            buffer: Mutex::new(VecDeque::new()),
            flush_signal: Notify::new(),
            shutdown_tx,
            flusher: Mutex::new(None),
        })
    }

    /// Starts the background flush loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut flusher = self.flusher.lock();
        if flusher.is_some() {
            return;
        }
        let tracer = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        *flusher = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracer.config.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tracer.flush().await,
                    () = tracer.flush_signal.notified() => tracer.flush().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
        }));
    }

    // -- context stack ------------------------------------------------------

    /// Context at the top of the stack, if any scope is active.
    #[must_use]
    pub fn current_context(&self) -> Option<TraceContext> {
        self.stack.lock().last().cloned()
    }

    /// Enters a traced scope.
    pub fn push_context(&self, ctx: TraceContext) {
        self.stack.lock().push(ctx);
    }

    /// Leaves the innermost traced scope.
    pub fn pop_context(&self) -> Option<TraceContext> {
        self.stack.lock().pop()
    }

    // -- span lifecycle -----------------------------------------------------

    /// Starts a span under the current context, or as a new root.
    ///
    /// Sampling applies only at the root: a child of a sampled parent is
    /// always recorded (and of an unsampled parent, never), preserving
    /// whole-trace completeness.
    #[must_use]
    pub fn start_span(&self, name: impl Into<String>, kind: SpanKind) -> Span {
        self.start_span_from(name, kind, self.current_context())
    }

    /// Starts a span under an explicit parent (e.g. an incoming request's
    /// context), or as a new root when `parent` is `None`.
    #[must_use]
    pub fn start_span_from(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        parent: Option<TraceContext>,
    ) -> Span {
        let start_unix_ms = Utc::now().timestamp_millis();
        match parent {
            Some(parent_ctx) => {
                let recorded = parent_ctx.is_sampled();
                let context = TraceContext {
                    trace_id: parent_ctx.trace_id,
                    span_id: generate_span_id(),
                    trace_flags: parent_ctx.trace_flags,
                    trace_state: parent_ctx.trace_state.clone(),
                };
                Span::new(
                    context,
                    Some(parent_ctx.span_id),
                    name.into(),
                    kind,
                    start_unix_ms,
                    recorded,
                )
            }
            None => {
                let trace_id = generate_trace_id();
                let sampled = self.config.sampler.should_sample(Some(&trace_id));
                let context = TraceContext {
                    trace_id,
                    span_id: generate_span_id(),
                    trace_flags: if sampled { TraceContext::FLAG_SAMPLED } else { 0 },
                    trace_state: None,
                };
                Span::new(context, None, name.into(), kind, start_unix_ms, sampled)
            }
        }
    }

    /// Seals a span and buffers it for export if it is recorded.
    pub fn finish_span(&self, span: Span) {
        let (data, recorded) = span.seal();
        if !recorded {
            return;
        }
        let should_flush;
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.config.max_buffer_size {
                buffer.pop_front();
                warn!("span buffer full, dropping oldest span");
            }
            buffer.push_back(data);
            should_flush = buffer.len() >= self.config.max_batch_size;
        }
        if should_flush {
            self.flush_signal.notify_one();
        }
    }

    /// Runs `f` inside a new span: the span's context is active for the
    /// duration, the span seals `ok` on success or `error` on failure, and
    /// the result is returned unchanged.
    pub async fn in_span<F, Fut, T, E>(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut span = self.start_span(name, kind);
        self.push_context(span.context().clone());
        let result = f().await;
        self.pop_context();
        match &result {
            Ok(_) => span.set_status_ok(),
            Err(e) => span.record_error(&e.to_string()),
        }
        self.finish_span(span);
        result
    }

    // -- export -------------------------------------------------------------

    /// Drains the buffer through the exporter in batches. A failed batch is
    /// requeued at the front and retried on the next flush.
    pub async fn flush(&self) {
        loop {
            let batch: Vec<SpanData> = {
                let mut buffer = self.buffer.lock();
                let n = buffer.len().min(self.config.max_batch_size);
                buffer.drain(..n).collect()
            };
            if batch.is_empty() {
                return;
            }
            if let Err(error) = self.exporter.export(&batch).await {
                warn!(%error, batch_len = batch.len(), "span export failed, requeueing batch");
                let mut buffer = self.buffer.lock();
                for span in batch.into_iter().rev() {
                    buffer.push_front(span);
                }
                return;
            }
        }
    }

    /// Spans currently waiting for export.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Stops the flush loop and flushes whatever remains.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.flush().await;
    }
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

fn generate_trace_id() -> [u8; 16] {
    loop {
        let id: [u8; 16] = rand::random();
        if id != [0u8; 16] {
            return id;
        }
    }
}

fn generate_span_id() -> [u8; 8] {
    loop {
        let id: [u8; 8] = rand::random();
        if id != [0u8; 8] {
            return id;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::super::span::SpanStatus;
    use super::*;

    /// Exporter that collects spans, optionally failing the first N calls.
    #[derive(Default)]
    struct CollectingExporter {
        spans: Mutex<Vec<SpanData>>,
        failures_left: AtomicU32,
    }

    impl CollectingExporter {
        fn failing(times: u32) -> Self {
            Self { spans: Mutex::new(Vec::new()), failures_left: AtomicU32::new(times) }
        }

        fn names(&self) -> Vec<String> {
            self.spans.lock().iter().map(|s| s.name.clone()).collect()
        }
    }

    #[async_trait]
    impl SpanExporter for CollectingExporter {
        async fn export(&self, batch: &[SpanData]) -> anyhow::Result<()> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("collector unavailable");
            }
            self.spans.lock().extend_from_slice(batch);
            Ok(())
        }
    }

    fn tracer_with(sampler: Sampler, exporter: Arc<CollectingExporter>) -> Arc<Tracer> {
        Tracer::new(
            TracerConfig { sampler, ..TracerConfig::default() },
            exporter as Arc<dyn SpanExporter>,
        )
    }

    #[tokio::test]
    async fn root_span_respects_never_sampler() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = tracer_with(Sampler::Never, Arc::clone(&exporter));

        let span = tracer.start_span("op", SpanKind::Internal);
        assert!(!span.is_recorded());
        tracer.finish_span(span);
        tracer.flush().await;
        assert!(exporter.names().is_empty());
    }

    #[tokio::test]
    async fn child_of_sampled_parent_is_always_recorded() {
        let exporter = Arc::new(CollectingExporter::default());
        // Never-sampler: only explicit parents can make children recorded.
        let tracer = tracer_with(Sampler::Never, Arc::clone(&exporter));

        let parent = TraceContext {
            trace_id: [7; 16],
            span_id: [1; 8],
            trace_flags: TraceContext::FLAG_SAMPLED,
            trace_state: None,
        };
        tracer.push_context(parent.clone());
        let span = tracer.start_span("child", SpanKind::Internal);
        assert!(span.is_recorded());
        assert_eq!(span.context().trace_id, parent.trace_id);
        tracer.pop_context();

        tracer.finish_span(span);
        tracer.flush().await;
        assert_eq!(exporter.names(), vec!["child".to_string()]);
        assert_eq!(exporter.spans.lock()[0].parent_span_id, Some([1; 8]));
    }

    #[tokio::test]
    async fn in_span_seals_ok_and_restores_the_stack() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = tracer_with(Sampler::Always, Arc::clone(&exporter));

        let result: Result<i32, anyhow::Error> =
            tracer.in_span("work", SpanKind::Internal, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(tracer.current_context().is_none());

        tracer.flush().await;
        let spans = exporter.spans.lock();
        assert_eq!(spans[0].status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn in_span_seals_error_and_rethrows() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = tracer_with(Sampler::Always, Arc::clone(&exporter));

        let result: Result<(), anyhow::Error> = tracer
            .in_span("work", SpanKind::Internal, || async { anyhow::bail!("exploded") })
            .await;
        assert!(result.is_err());

        tracer.flush().await;
        let spans = exporter.spans.lock();
        assert_eq!(spans[0].status, SpanStatus::Error { message: "exploded".into() });
    }

    #[tokio::test]
    async fn nested_spans_link_parentage() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = tracer_with(Sampler::Always, Arc::clone(&exporter));

        let _: Result<(), anyhow::Error> = tracer
            .in_span("outer", SpanKind::Server, || async {
                tracer.in_span("inner", SpanKind::Internal, || async { Ok(()) }).await
            })
            .await;

        tracer.flush().await;
        let spans = exporter.spans.lock();
        // inner seals first
        assert_eq!(spans[0].name, "inner");
        assert_eq!(spans[1].name, "outer");
        assert_eq!(spans[0].context.trace_id, spans[1].context.trace_id);
        assert_eq!(spans[0].parent_span_id, Some(spans[1].context.span_id));
    }

    #[tokio::test]
    async fn failed_export_requeues_at_the_front() {
        let exporter = Arc::new(CollectingExporter::failing(1));
        let tracer = tracer_with(Sampler::Always, Arc::clone(&exporter));

        for name in ["a", "b", "c"] {
            let span = tracer.start_span(name, SpanKind::Internal);
            tracer.finish_span(span);
        }

        tracer.flush().await; // fails, requeues
        assert_eq!(tracer.buffered_len(), 3);
        tracer.flush().await; // succeeds, order preserved
        assert_eq!(exporter.names(), vec!["a".to_string(), "b".into(), "c".into()]);
    }

    #[tokio::test]
    async fn buffer_cap_drops_the_oldest_span() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = Tracer::new(
            TracerConfig {
                max_buffer_size: 2,
                max_batch_size: 10,
                ..TracerConfig::default()
            },
            Arc::clone(&exporter) as Arc<dyn SpanExporter>,
        );

        for name in ["a", "b", "c"] {
            let span = tracer.start_span(name, SpanKind::Internal);
            tracer.finish_span(span);
        }
        tracer.flush().await;
        assert_eq!(exporter.names(), vec!["b".to_string(), "c".into()]);
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_spans() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = tracer_with(Sampler::Always, Arc::clone(&exporter));
        tracer.start();

        let span = tracer.start_span("tail", SpanKind::Internal);
        tracer.finish_span(span);
        tracer.shutdown().await;
        assert_eq!(exporter.names(), vec!["tail".to_string()]);
    }
}
