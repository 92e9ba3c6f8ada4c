//! Asynchronous events: emitter, handler registry, and the in-memory bus.
//!
//! Control flow: `EventEmitter::emit` stamps a `ParsEvent` and hands it to
//! an `EventTransport`; the transport dispatches through the `EventBus` to
//! every attached `HandlerRegistry`, which pattern-matches the type and runs
//! all matching handlers concurrently with per-handler retry and
//! dead-lettering.

pub mod bus;
pub mod emitter;
pub mod registry;

pub use bus::{DuplicateAttachmentError, EventBus, EventTransport, InMemoryEventTransport};
pub use emitter::{EmitOptions, EventEmitter, ScopedEmitter};
pub use registry::{
    event_handler_fn, Backoff, DeadLetterEntry, EventHandler, HandlerOptions, HandlerRegistry,
    OnExhausted, Subscription, BASE_RETRY_DELAY_MS,
};
