//! In-memory event transport and the process-wide bus.
//!
//! The bus connects independently-registered services: each attaches its
//! handler registry under its service name, exactly once. It is an
//! explicitly constructed object with a single-instance lifecycle --
//! construct one at process start and pass it by reference to emitter and
//! service factories; there is no hidden global.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use pars_core::ParsEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::registry::HandlerRegistry;

/// Attaching a second registry under an already-taken service name is a
/// configuration error; the bus never silently overwrites.
#[derive(Debug, Error)]
#[error("service already attached to event bus: {0}")]
pub struct DuplicateAttachmentError(pub String);

// ---------------------------------------------------------------------------
// EventTransport
// ---------------------------------------------------------------------------

/// Carries events from an emitter to whoever handles them.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Hands one event over for delivery.
    async fn emit(&self, event: ParsEvent) -> anyhow::Result<()>;

    /// Releases underlying resources. Idempotent; default is a no-op.
    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Name-keyed fan-out point across services in one process.
#[derive(Default)]
pub struct EventBus {
    targets: DashMap<String, Arc<HandlerRegistry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a service's registry, exactly once per name.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateAttachmentError`] if the name is already taken.
    pub fn attach(
        &self,
        service: impl Into<String>,
        registry: Arc<HandlerRegistry>,
    ) -> Result<(), DuplicateAttachmentError> {
        let service = service.into();
        match self.targets.entry(service.clone()) {
            Entry::Occupied(_) => Err(DuplicateAttachmentError(service)),
            Entry::Vacant(slot) => {
                slot.insert(registry);
                Ok(())
            }
        }
    }

    /// Detaches a service, freeing its name for re-registration.
    pub fn detach(&self, service: &str) -> Option<Arc<HandlerRegistry>> {
        self.targets.remove(service).map(|(_, registry)| registry)
    }

    /// Delivers `event` to every attached registry concurrently.
    pub async fn dispatch(&self, event: &ParsEvent) {
        let registries: Vec<Arc<HandlerRegistry>> =
            self.targets.iter().map(|entry| Arc::clone(entry.value())).collect();
        join_all(registries.iter().map(|registry| registry.handle(event))).await;
    }
}

// ---------------------------------------------------------------------------
// InMemoryEventTransport
// ---------------------------------------------------------------------------

/// In-process transport over an [`EventBus`], in one of two modes:
///
/// - **Sync**: `emit` awaits the full dispatch (handlers, retries and all).
/// - **Queued**: `emit` enqueues and returns; a single worker task drains
///   the queue in order, preserving per-emitter submission order while
///   decoupling emit latency from handler latency.
pub struct InMemoryEventTransport {
    bus: Arc<EventBus>,
    queue: Option<Mutex<Option<mpsc::Sender<ParsEvent>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryEventTransport {
    /// Synchronous dispatch.
    #[must_use]
    pub fn new_sync(bus: Arc<EventBus>) -> Self {
        Self { bus, queue: None, worker: Mutex::new(None) }
    }

    /// Queued dispatch with a bounded queue; `emit` applies backpressure
    /// when the queue is full.
    #[must_use]
    pub fn new_queued(bus: Arc<EventBus>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ParsEvent>(capacity);
        let worker_bus = Arc::clone(&bus);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker_bus.dispatch(&event).await;
            }
        });
        Self {
            bus,
            queue: Some(Mutex::new(Some(tx))),
            worker: Mutex::new(Some(worker)),
        }
    }
}

#[async_trait]
impl EventTransport for InMemoryEventTransport {
    async fn emit(&self, event: ParsEvent) -> anyhow::Result<()> {
        match &self.queue {
            None => {
                self.bus.dispatch(&event).await;
                Ok(())
            }
            Some(slot) => {
                let sender = slot.lock().clone();
                match sender {
                    Some(tx) => tx
                        .send(event)
                        .await
                        .map_err(|_| anyhow::anyhow!("queued event transport is closed")),
                    None => anyhow::bail!("queued event transport is closed"),
                }
            }
        }
    }

    /// Closes the queue (if any) and waits for the worker to drain it.
    async fn close(&self) {
        if let Some(slot) = &self.queue {
            slot.lock().take();
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
