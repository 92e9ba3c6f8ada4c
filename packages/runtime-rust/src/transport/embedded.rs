//! In-process transport: direct dispatch to a co-located server.
//!
//! The registry is a uniquely-keyed map from service name to server -- one
//! instance per name, no load balancing. It is an explicitly constructed
//! object passed by reference to whoever needs it, not a hidden global:
//! construct one at process start and share it via `Arc`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pars_core::messages::rpc::{RpcRequest, RpcResponse};
use pars_core::RpcError;
use thiserror::Error;

use super::Transport;
use crate::rpc::server::RpcServer;

/// Registering a second server under an already-taken name is a fatal
/// configuration error; the registry never silently overwrites.
#[derive(Debug, Error)]
#[error("service already registered: {0}")]
pub struct DuplicateServiceError(pub String);

// ---------------------------------------------------------------------------
// EmbeddedRegistry
// ---------------------------------------------------------------------------

/// Process-local map of service name to server instance.
#[derive(Default)]
pub struct EmbeddedRegistry {
    servers: DashMap<String, Arc<RpcServer>>,
}

impl EmbeddedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server under its service name, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateServiceError`] if the name is already taken.
    pub fn register(&self, server: Arc<RpcServer>) -> Result<(), DuplicateServiceError> {
        let name = server.service_name().to_string();
        match self.servers.entry(name.clone()) {
            Entry::Occupied(_) => Err(DuplicateServiceError(name)),
            Entry::Vacant(slot) => {
                slot.insert(server);
                Ok(())
            }
        }
    }

    /// Removes and returns the server registered under `name`, if any.
    pub fn unregister(&self, name: &str) -> Option<Arc<RpcServer>> {
        self.servers.remove(name).map(|(_, server)| server)
    }

    /// Looks up the server registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RpcServer>> {
        self.servers.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

// ---------------------------------------------------------------------------
// EmbeddedTransport
// ---------------------------------------------------------------------------

/// Transport that resolves the target in an [`EmbeddedRegistry`] and calls
/// `handle` directly -- no serialization.
pub struct EmbeddedTransport {
    registry: Arc<EmbeddedRegistry>,
}

impl EmbeddedTransport {
    #[must_use]
    pub fn new(registry: Arc<EmbeddedRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Transport for EmbeddedTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        let server = self
            .registry
            .get(&request.service)
            .ok_or_else(|| RpcError::ServiceNotFound(request.service.clone()))?;
        Ok(server.handle(request).await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
