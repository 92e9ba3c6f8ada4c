//! `Pars` Runtime — RPC dispatch, transports, resilience, events, and tracing.
//!
//! The runtime wires the `pars-core` envelopes into a working system:
//!
//! 1. **RPC** (`rpc`): server-side dispatch with middleware and timeouts,
//!    and the client that builds requests and unwraps responses.
//! 2. **Transports** (`transport`): embedded (in-process), HTTP, and
//!    binding (host-provided channel) -- interchangeable behind one trait.
//! 3. **Resilience** (`resilience`): circuit breaker + bulkhead wrapped
//!    around any transport on the client side.
//! 4. **Events** (`events`): emitter, pattern-matched handler registry with
//!    retry and dead-lettering, and the in-memory bus.
//! 5. **Tracing** (`trace`): span recording, sampling, and export.

pub mod config;
pub mod events;
pub mod resilience;
pub mod rpc;
pub mod telemetry;
pub mod trace;
pub mod transport;

pub use config::ServerConfig;
pub use rpc::client::RpcClient;
pub use rpc::server::RpcServer;
pub use transport::Transport;
