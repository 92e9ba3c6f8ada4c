//! Event emitter: envelope stamping and hand-off to the event transport.
//!
//! Emission is fire-and-forget with respect to handler outcomes: `emit`
//! reports only whether the transport accepted the event.

use std::sync::Arc;

use pars_core::definition::DeliveryGuarantee;
use pars_core::messages::event::{timestamp_now, EVENT_CONTENT_TYPE, EVENT_SPEC_VERSION};
use pars_core::{ParsEvent, ServiceDefinition};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::bus::EventTransport;
use crate::trace::Tracer;

// ---------------------------------------------------------------------------
// EmitOptions
// ---------------------------------------------------------------------------

/// Per-emission attributes. Everything is optional; a scoped emitter can
/// pre-fill any subset as defaults.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub subject: Option<String>,
    pub tenant_id: Option<String>,
    pub request_id: Option<String>,
    /// Explicit trace context; when absent, the emitter's tracer (if any)
    /// supplies the current one.
    pub trace_context: Option<String>,
    /// Overrides the delivery guarantee declared in the definition.
    pub delivery: Option<DeliveryGuarantee>,
}

impl EmitOptions {
    /// Field-wise merge: values present in `self` win over `defaults`.
    #[must_use]
    pub fn or(self, defaults: &EmitOptions) -> EmitOptions {
        EmitOptions {
            subject: self.subject.or_else(|| defaults.subject.clone()),
            tenant_id: self.tenant_id.or_else(|| defaults.tenant_id.clone()),
            request_id: self.request_id.or_else(|| defaults.request_id.clone()),
            trace_context: self.trace_context.or_else(|| defaults.trace_context.clone()),
            delivery: self.delivery.or(defaults.delivery),
        }
    }
}

// ---------------------------------------------------------------------------
// EventEmitter
// ---------------------------------------------------------------------------

/// Emits events on behalf of one service.
#[derive(Clone)]
pub struct EventEmitter {
    definition: Arc<ServiceDefinition>,
    transport: Arc<dyn EventTransport>,
    tracer: Option<Arc<Tracer>>,
}

impl EventEmitter {
    #[must_use]
    pub fn new(definition: Arc<ServiceDefinition>, transport: Arc<dyn EventTransport>) -> Self {
        Self { definition, transport, tracer: None }
    }

    /// Attaches a tracer so emitted events carry the current trace context.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Emits one event and returns its generated id.
    ///
    /// An undeclared event type logs a warning but still emits: declaring is
    /// a contract hygiene matter, not a delivery gate.
    ///
    /// # Errors
    ///
    /// Only transport-level failures; handler outcomes never surface here.
    pub async fn emit(
        &self,
        event_type: &str,
        data: Value,
        options: EmitOptions,
    ) -> anyhow::Result<String> {
        let declared = self.definition.declared_delivery(event_type);
        if declared.is_none() {
            warn!(
                event_type,
                source = self.definition.name(),
                "emitting event type not declared by the service definition"
            );
        }
        let trace_context = options.trace_context.or_else(|| {
            self.tracer
                .as_ref()
                .and_then(|tracer| tracer.current_context())
                .map(|ctx| ctx.traceparent())
        });
        let event = ParsEvent {
            specversion: EVENT_SPEC_VERSION.to_string(),
            event_type: event_type.to_string(),
            source: self.definition.name().to_string(),
            id: Uuid::new_v4().to_string(),
            time: timestamp_now(),
            datacontenttype: Some(EVENT_CONTENT_TYPE.to_string()),
            data,
            subject: options.subject,
            tenant_id: options.tenant_id,
            request_id: options.request_id,
            trace_context,
            delivery: options.delivery.or(declared),
        };
        let id = event.id.clone();
        self.transport.emit(event).await?;
        Ok(id)
    }

    /// Emits a batch sequentially, preserving submission order, and returns
    /// every generated id.
    ///
    /// # Errors
    ///
    /// Stops at the first transport failure; ids of already-emitted events
    /// are lost with the error, matching the transport-level contract.
    pub async fn emit_batch(
        &self,
        events: Vec<(String, Value)>,
        options: EmitOptions,
    ) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::with_capacity(events.len());
        for (event_type, data) in events {
            ids.push(self.emit(&event_type, data, options.clone()).await?);
        }
        Ok(ids)
    }

    /// Creates an emitter that applies `defaults` to every emission.
    #[must_use]
    pub fn scoped(&self, defaults: EmitOptions) -> ScopedEmitter {
        ScopedEmitter { emitter: self.clone(), defaults }
    }
}

// ---------------------------------------------------------------------------
// ScopedEmitter
// ---------------------------------------------------------------------------

/// An emitter with captured default options (e.g. a fixed tenant id).
#[derive(Clone)]
pub struct ScopedEmitter {
    emitter: EventEmitter,
    defaults: EmitOptions,
}

impl ScopedEmitter {
    /// Emits with the captured defaults.
    ///
    /// # Errors
    ///
    /// See [`EventEmitter::emit`].
    pub async fn emit(&self, event_type: &str, data: Value) -> anyhow::Result<String> {
        self.emitter.emit(event_type, data, self.defaults.clone()).await
    }

    /// Emits with explicit options; explicit values win over the defaults.
    ///
    /// # Errors
    ///
    /// See [`EventEmitter::emit`].
    pub async fn emit_with(
        &self,
        event_type: &str,
        data: Value,
        options: EmitOptions,
    ) -> anyhow::Result<String> {
        self.emitter.emit(event_type, data, options.or(&self.defaults)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use semver::Version;
    use serde_json::json;

    use super::*;

    /// Transport that records emitted events.
    #[derive(Default)]
    struct CapturingTransport {
        events: Mutex<Vec<ParsEvent>>,
    }

    #[async_trait]
    impl EventTransport for CapturingTransport {
        async fn emit(&self, event: ParsEvent) -> anyhow::Result<()> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    fn definition() -> Arc<ServiceDefinition> {
        Arc::new(
            ServiceDefinition::builder("orders", Version::new(2, 0, 0))
                .emits("order.created", DeliveryGuarantee::AtLeastOnce)
                .emits("order.viewed", DeliveryGuarantee::AtMostOnce)
                .build(),
        )
    }

    fn emitter(transport: Arc<CapturingTransport>) -> EventEmitter {
        EventEmitter::new(definition(), transport as Arc<dyn EventTransport>)
    }

    #[tokio::test]
    async fn emit_stamps_the_envelope() {
        let transport = Arc::new(CapturingTransport::default());
        let emitter = emitter(Arc::clone(&transport));

        let id = emitter
            .emit("order.created", json!({ "orderId": "ord-1" }), EmitOptions::default())
            .await
            .unwrap();

        let events = transport.events.lock();
        let event = &events[0];
        assert_eq!(event.id, id);
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.source, "orders");
        assert_eq!(event.event_type, "order.created");
        assert_eq!(event.datacontenttype.as_deref(), Some("application/json"));
        assert_eq!(event.delivery, Some(DeliveryGuarantee::AtLeastOnce));
    }

    #[tokio::test]
    async fn each_emission_gets_a_fresh_id() {
        let transport = Arc::new(CapturingTransport::default());
        let emitter = emitter(Arc::clone(&transport));
        let a = emitter.emit("order.created", json!(1), EmitOptions::default()).await.unwrap();
        let b = emitter.emit("order.created", json!(2), EmitOptions::default()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn undeclared_type_still_emits() {
        let transport = Arc::new(CapturingTransport::default());
        let emitter = emitter(Arc::clone(&transport));
        emitter.emit("order.archived", json!({}), EmitOptions::default()).await.unwrap();
        let events = transport.events.lock();
        assert_eq!(events[0].event_type, "order.archived");
        assert_eq!(events[0].delivery, None);
    }

    #[tokio::test]
    async fn options_override_the_declared_delivery() {
        let transport = Arc::new(CapturingTransport::default());
        let emitter = emitter(Arc::clone(&transport));
        emitter
            .emit(
                "order.created",
                json!({}),
                EmitOptions {
                    delivery: Some(DeliveryGuarantee::AtMostOnce),
                    ..EmitOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(transport.events.lock()[0].delivery, Some(DeliveryGuarantee::AtMostOnce));
    }

    #[tokio::test]
    async fn emit_batch_preserves_order_and_returns_all_ids() {
        let transport = Arc::new(CapturingTransport::default());
        let emitter = emitter(Arc::clone(&transport));
        let ids = emitter
            .emit_batch(
                vec![
                    ("order.created".to_string(), json!(1)),
                    ("order.viewed".to_string(), json!(2)),
                    ("order.viewed".to_string(), json!(3)),
                ],
                EmitOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        let events = transport.events.lock();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["order.created", "order.viewed", "order.viewed"]);
        let emitted_ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, emitted_ids);
    }

    #[tokio::test]
    async fn scoped_emitter_applies_captured_defaults() {
        let transport = Arc::new(CapturingTransport::default());
        let scoped = emitter(Arc::clone(&transport)).scoped(EmitOptions {
            tenant_id: Some("acme".into()),
            ..EmitOptions::default()
        });

        scoped.emit("order.created", json!({})).await.unwrap();
        scoped
            .emit_with(
                "order.created",
                json!({}),
                EmitOptions { tenant_id: Some("globex".into()), ..EmitOptions::default() },
            )
            .await
            .unwrap();

        let events = transport.events.lock();
        assert_eq!(events[0].tenant_id.as_deref(), Some("acme"));
        assert_eq!(events[1].tenant_id.as_deref(), Some("globex"));
    }

    #[tokio::test]
    async fn tracer_context_is_attached_when_active() {
        use crate::trace::{ConsoleExporter, SpanKind, Tracer, TracerConfig};

        let transport = Arc::new(CapturingTransport::default());
        let tracer = Tracer::new(TracerConfig::default(), Arc::new(ConsoleExporter));
        let emitter = emitter(Arc::clone(&transport)).with_tracer(Arc::clone(&tracer));

        let span = tracer.start_span("scope", SpanKind::Producer);
        tracer.push_context(span.context().clone());
        emitter.emit("order.created", json!({}), EmitOptions::default()).await.unwrap();
        tracer.pop_context();
        tracer.finish_span(span);

        let events = transport.events.lock();
        let ctx = events[0].trace_context.as_deref().unwrap();
        assert!(ctx.starts_with("00-"));
    }
}
