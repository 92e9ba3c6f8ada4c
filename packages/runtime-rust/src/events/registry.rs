//! Event handler registry: pattern-matched fan-out with retry, backoff,
//! and dead-lettering.
//!
//! All handlers matching an event run concurrently; each failure is retried
//! independently with a short fixed base delay. That base is deliberately
//! decoupled from business-level retry timing -- domain services own their
//! own schedules; this layer only smooths transient hiccups.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::RwLock;
use pars_core::pattern;
use pars_core::ParsEvent;
use serde::Serialize;
use tracing::{error, warn};

/// Base delay between handler retry attempts.
pub const BASE_RETRY_DELAY_MS: u64 = 25;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Delay growth mode between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
}

/// What to do after the final failed attempt (besides dead-lettering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExhausted {
    /// Log at warn level.
    #[default]
    Log,
    /// Escalate at error level.
    Alert,
    /// Drop silently.
    Discard,
}

/// Per-registration execution options.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Retries after the first attempt; a handler runs `retries + 1` times.
    pub retries: u32,
    pub backoff: Backoff,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    pub on_exhausted: OnExhausted,
    /// Dead-letter queue recording exhausted deliveries, if configured.
    pub dead_letter: Option<String>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Backoff::default(),
            max_delay: Duration::from_secs(1),
            on_exhausted: OnExhausted::default(),
            dead_letter: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// An event handler. Failures are retried by the registry; the error is
/// opaque here -- only its message survives into logs and dead letters.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ParsEvent) -> anyhow::Result<()>;
}

/// Wraps an async closure as an [`EventHandler`].
pub fn event_handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(ParsEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnEventHandler(f))
}

struct FnEventHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(ParsEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: ParsEvent) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

// ---------------------------------------------------------------------------
// Dead letters
// ---------------------------------------------------------------------------

/// Record of a delivery whose retries were exhausted. Serializable so
/// operators can export a queue for offline inspection.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterEntry {
    pub event: ParsEvent,
    pub error: String,
    pub pattern: String,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Registration {
    id: u64,
    pattern: String,
    handler: Arc<dyn EventHandler>,
    options: HandlerOptions,
}

/// Pattern-keyed registry of event handlers for one service.
pub struct HandlerRegistry {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    dead_letters: DashMap<String, Vec<DeadLetterEntry>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dead_letters: DashMap::new(),
        }
    }

    /// Registers `handler` for `pattern` and returns the handle that removes
    /// exactly this registration. Many registrations may share a pattern;
    /// dropping the handle does not unsubscribe.
    pub fn register(
        self: &Arc<Self>,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: HandlerOptions,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.write().push(Registration {
            id,
            pattern: pattern.into(),
            handler,
            options,
        });
        Subscription { id, registry: Arc::clone(self) }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Delivers `event` to every matching registration, concurrently.
    ///
    /// Handler outcomes never propagate to the emitter: failures retry,
    /// then dead-letter per the registration's options.
    pub async fn handle(&self, event: &ParsEvent) {
        let matching: Vec<Registration> = self
            .registrations
            .read()
            .iter()
            .filter(|reg| pattern::matches(&event.event_type, &reg.pattern))
            .cloned()
            .collect();
        if matching.is_empty() {
            return;
        }
        join_all(matching.into_iter().map(|reg| self.run_with_retry(event.clone(), reg))).await;
    }

    async fn run_with_retry(&self, event: ParsEvent, reg: Registration) {
        let total_attempts = reg.options.retries + 1;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match reg.handler.handle(event.clone()).await {
                Ok(()) => return,
                Err(_) if attempt < total_attempts => {
                    tokio::time::sleep(retry_delay(
                        reg.options.backoff,
                        attempt,
                        reg.options.max_delay,
                    ))
                    .await;
                }
                Err(err) => {
                    self.exhausted(&event, &reg, &err, attempt);
                    return;
                }
            }
        }
    }

    fn exhausted(&self, event: &ParsEvent, reg: &Registration, err: &anyhow::Error, attempts: u32) {
        if let Some(queue) = &reg.options.dead_letter {
            self.dead_letters.entry(queue.clone()).or_default().push(DeadLetterEntry {
                event: event.clone(),
                error: err.to_string(),
                pattern: reg.pattern.clone(),
                attempts,
                at: Utc::now(),
            });
        }
        match reg.options.on_exhausted {
            OnExhausted::Log => warn!(
                event_type = %event.event_type,
                pattern = %reg.pattern,
                attempts,
                error = %err,
                "event handler exhausted retries"
            ),
            OnExhausted::Alert => error!(
                event_type = %event.event_type,
                pattern = %reg.pattern,
                attempts,
                error = %err,
                "event handler exhausted retries"
            ),
            OnExhausted::Discard => {}
        }
    }

    /// Snapshot of a dead-letter queue.
    #[must_use]
    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetterEntry> {
        self.dead_letters.get(queue).map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Removes and returns a dead-letter queue's contents.
    pub fn drain_dead_letters(&self, queue: &str) -> Vec<DeadLetterEntry> {
        self.dead_letters.remove(queue).map(|(_, entries)| entries).unwrap_or_default()
    }

    fn unsubscribe(&self, id: u64) {
        self.registrations.write().retain(|reg| reg.id != id);
    }
}

/// Computes the delay before the next attempt. `attempt` is the 1-based
/// number of attempts already made.
fn retry_delay(backoff: Backoff, attempt: u32, max_delay: Duration) -> Duration {
    let ms = match backoff {
        Backoff::Linear => BASE_RETRY_DELAY_MS.saturating_mul(u64::from(attempt)),
        Backoff::Exponential => {
            BASE_RETRY_DELAY_MS.saturating_mul(1u64 << (attempt - 1).min(32))
        }
    };
    Duration::from_millis(ms).min(max_delay)
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to one registration. `unsubscribe` removes exactly that
/// registration, leaving siblings on the same pattern untouched.
pub struct Subscription {
    id: u64,
    registry: Arc<HandlerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.registry.unsubscribe(self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use pars_core::messages::event::{timestamp_now, EVENT_SPEC_VERSION};
    use serde_json::{json, Value};

    use super::*;

    fn event(event_type: &str) -> ParsEvent {
        ParsEvent {
            specversion: EVENT_SPEC_VERSION.into(),
            event_type: event_type.into(),
            source: "orders".into(),
            id: "evt-1".into(),
            time: timestamp_now(),
            datacontenttype: Some("application/json".into()),
            data: json!({ "orderId": "ord-1" }),
            subject: None,
            tenant_id: None,
            request_id: None,
            trace_context: None,
            delivery: None,
        }
    }

    fn counting_handler(calls: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
        event_handler_fn(move |_event| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn failing_handler(calls: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
        event_handler_fn(move |_event| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("handler exploded")
            }
        })
    }

    #[test]
    fn retry_delay_grows_linearly_and_exponentially() {
        let max = Duration::from_secs(10);
        assert_eq!(retry_delay(Backoff::Linear, 1, max), Duration::from_millis(25));
        assert_eq!(retry_delay(Backoff::Linear, 2, max), Duration::from_millis(50));
        assert_eq!(retry_delay(Backoff::Linear, 3, max), Duration::from_millis(75));
        assert_eq!(retry_delay(Backoff::Exponential, 1, max), Duration::from_millis(25));
        assert_eq!(retry_delay(Backoff::Exponential, 2, max), Duration::from_millis(50));
        assert_eq!(retry_delay(Backoff::Exponential, 3, max), Duration::from_millis(100));
    }

    #[test]
    fn retry_delay_caps_at_max() {
        let max = Duration::from_millis(60);
        assert_eq!(retry_delay(Backoff::Exponential, 5, max), max);
        assert_eq!(retry_delay(Backoff::Linear, 100, max), max);
    }

    #[tokio::test(start_paused = true)]
    async fn matching_handlers_all_run() {
        let registry = Arc::new(HandlerRegistry::new());
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        let c = Arc::new(AtomicU32::new(0));
        let _sa = registry.register("order.*", counting_handler(Arc::clone(&a)), HandlerOptions::default());
        let _sb = registry.register("order.created", counting_handler(Arc::clone(&b)), HandlerOptions::default());
        let _sc = registry.register("payment.*", counting_handler(Arc::clone(&c)), HandlerOptions::default());

        registry.handle(&event("order.created")).await;

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_handler_runs_retries_plus_one_then_dead_letters_once() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        let _sub = registry.register(
            "order.*",
            failing_handler(Arc::clone(&calls)),
            HandlerOptions {
                retries: 2,
                dead_letter: Some("orders-dlq".into()),
                ..HandlerOptions::default()
            },
        );

        registry.handle(&event("order.created")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3, "retries + 1 total attempts");
        let entries = registry.dead_letters("orders-dlq");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 3);
        assert_eq!(entries[0].pattern, "order.*");
        assert!(entries[0].error.contains("handler exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn linear_backoff_timing_and_recovery_before_exhaustion() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        // Fails twice, succeeds on the third attempt.
        let handler = event_handler_fn({
            let calls = Arc::clone(&calls);
            move |_event| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("transient")
                    }
                    Ok(())
                }
            }
        });
        let _sub = registry.register(
            "order.*",
            handler,
            HandlerOptions {
                retries: 2,
                backoff: Backoff::Linear,
                dead_letter: Some("orders-dlq".into()),
                ..HandlerOptions::default()
            },
        );

        let started = tokio::time::Instant::now();
        registry.handle(&event("order.created")).await;
        let elapsed = started.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // base*1 + base*2 of sleep; paused time makes this exact.
        assert_eq!(elapsed, Duration::from_millis(BASE_RETRY_DELAY_MS * 3));
        assert!(registry.dead_letters("orders-dlq").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_failures_are_independent() {
        let registry = Arc::new(HandlerRegistry::new());
        let ok_calls = Arc::new(AtomicU32::new(0));
        let fail_calls = Arc::new(AtomicU32::new(0));
        let _ok = registry.register(
            "order.*",
            counting_handler(Arc::clone(&ok_calls)),
            HandlerOptions::default(),
        );
        let _fail = registry.register(
            "order.*",
            failing_handler(Arc::clone(&fail_calls)),
            HandlerOptions { retries: 0, ..HandlerOptions::default() },
        );

        registry.handle(&event("order.created")).await;

        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_removes_exactly_one_registration() {
        let registry = Arc::new(HandlerRegistry::new());
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        let sub_a =
            registry.register("order.*", counting_handler(Arc::clone(&a)), HandlerOptions::default());
        let _sub_b =
            registry.register("order.*", counting_handler(Arc::clone(&b)), HandlerOptions::default());

        sub_a.unsubscribe();
        registry.handle(&event("order.created")).await;

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_policy_skips_dead_letter_logging_but_not_the_queue() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        let _sub = registry.register(
            "order.*",
            failing_handler(Arc::clone(&calls)),
            HandlerOptions {
                retries: 0,
                on_exhausted: OnExhausted::Discard,
                dead_letter: Some("dlq".into()),
                ..HandlerOptions::default()
            },
        );
        registry.handle(&event("order.created")).await;
        assert_eq!(registry.dead_letters("dlq").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_empties_the_queue() {
        let registry = Arc::new(HandlerRegistry::new());
        let _sub = registry.register(
            "order.*",
            failing_handler(Arc::new(AtomicU32::new(0))),
            HandlerOptions {
                retries: 0,
                dead_letter: Some("dlq".into()),
                ..HandlerOptions::default()
            },
        );
        registry.handle(&event("order.created")).await;

        assert_eq!(registry.drain_dead_letters("dlq").len(), 1);
        assert!(registry.dead_letters("dlq").is_empty());
    }
}
