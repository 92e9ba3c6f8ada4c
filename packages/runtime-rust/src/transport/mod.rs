//! Pluggable call transports.
//!
//! Every transport implements the same `call(request) -> response` contract,
//! so the client and resilience layer are oblivious to whether a call is an
//! in-process dispatch ([`embedded`]), a serialized network hop ([`http`]),
//! or a host-provided channel ([`binding`]).

pub mod binding;
pub mod embedded;
pub mod http;

use async_trait::async_trait;
use pars_core::messages::rpc::{RpcRequest, RpcResponse};
use pars_core::RpcError;

pub use binding::BindingTransport;
pub use embedded::{DuplicateServiceError, EmbeddedRegistry, EmbeddedTransport};
pub use http::{rpc_router, HttpTransport, HttpTransportConfig, RpcHttpServer};

/// A channel capable of carrying one RPC call to its target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Carries `request` to the target and returns its response.
    ///
    /// An `Err` means the call itself failed (network, serialization,
    /// rejection); a target-side failure arrives as a response with
    /// `success: false`.
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError>;

    /// Releases underlying resources. Idempotent; default is a no-op.
    async fn close(&self) {}
}
