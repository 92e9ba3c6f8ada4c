//! RPC dispatch: server-side handling and the calling client.
//!
//! 1. **Handlers** (`handler`): the per-method handler trait and call context
//! 2. **Middleware** (`middleware`): ordered chain with explicit continuation
//! 3. **Server** (`server`): version gate, dispatch, timeout, normalization
//! 4. **Client** (`client`): request building, tracing, response unwrapping

pub mod client;
pub mod handler;
pub mod middleware;
pub mod server;

pub use client::{RpcClient, RpcClientBuilder};
pub use handler::{handler_fn, CallContext, MethodHandler};
pub use middleware::{Middleware, Next};
pub use server::{RpcServer, RpcServerBuilder};
