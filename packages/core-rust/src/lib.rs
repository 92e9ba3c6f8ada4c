//! `Pars` Core — service definitions, RPC envelopes, event format, and trace context.

pub mod context;
pub mod definition;
pub mod error;
pub mod messages;
pub mod pattern;
pub mod trace;

pub use context::RequestContext;
pub use definition::{DeliveryGuarantee, Deprecation, MethodSpec, ServiceDefinition};
pub use error::RpcError;
pub use messages::event::{CompactEvent, ParsEvent};
pub use messages::rpc::{ErrorBody, MethodKind, RpcRequest, RpcResponse};
pub use trace::TraceContext;
