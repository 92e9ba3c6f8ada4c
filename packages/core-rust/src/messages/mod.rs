//! Wire-compatible envelopes for the `Pars` protocol.
//!
//! All types serialize as JSON with camelCase field names. RPC envelopes live
//! in [`rpc`]; the CloudEvents-style event envelope and its compact
//! projection live in [`event`].

pub mod event;
pub mod rpc;

pub use event::{CompactEvent, ParsEvent, EVENT_SPEC_VERSION};
pub use rpc::{ErrorBody, MethodKind, RpcRequest, RpcResponse};
