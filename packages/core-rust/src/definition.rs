//! Static service descriptions shared by client and server.
//!
//! A [`ServiceDefinition`] names a service, pins its semantic version, and
//! declares its queries/mutations, the event types it emits (with their
//! delivery guarantee), and the event-type patterns it handles. Definitions
//! are immutable once built and are shared via `Arc`.

use std::collections::HashMap;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::messages::rpc::MethodKind;

// ---------------------------------------------------------------------------
// DeliveryGuarantee
// ---------------------------------------------------------------------------

/// Delivery guarantee declared for an emittable event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryGuarantee {
    #[serde(rename = "at-most-once")]
    AtMostOnce,
    #[serde(rename = "at-least-once")]
    AtLeastOnce,
}

// ---------------------------------------------------------------------------
// Method metadata
// ---------------------------------------------------------------------------

/// Deprecation metadata for a method still served for older callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deprecation {
    /// Why the method is deprecated.
    pub reason: String,
    /// Replacement method, surfaced in the server's warning log.
    pub replacement: Option<String>,
}

/// Declared shape of a single query or mutation.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub kind: MethodKind,
    pub deprecation: Option<Deprecation>,
}

// ---------------------------------------------------------------------------
// ServiceDefinition
// ---------------------------------------------------------------------------

/// Immutable description of a service's RPC and event surface.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    name: String,
    version: Version,
    methods: HashMap<String, MethodSpec>,
    events: HashMap<String, DeliveryGuarantee>,
    handled_patterns: Vec<String>,
}

impl ServiceDefinition {
    /// Starts building a definition for `name` at `version`.
    #[must_use]
    pub fn builder(name: impl Into<String>, version: Version) -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            name: name.into(),
            version,
            methods: HashMap::new(),
            events: HashMap::new(),
            handled_patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Looks up a declared method by name, regardless of kind.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    /// Looks up a declared method by name and kind.
    #[must_use]
    pub fn resolve(&self, name: &str, kind: MethodKind) -> Option<&MethodSpec> {
        self.methods.get(name).filter(|spec| spec.kind == kind)
    }

    /// Delivery guarantee declared for an event type, if any.
    #[must_use]
    pub fn declared_delivery(&self, event_type: &str) -> Option<DeliveryGuarantee> {
        self.events.get(event_type).copied()
    }

    /// Event-type patterns this service declares handlers for.
    #[must_use]
    pub fn handled_patterns(&self) -> &[String] {
        &self.handled_patterns
    }

    /// Whether a caller expecting `requested` is compatible with this
    /// definition's version, under caret semantics: the serving version must
    /// match `^requested`.
    ///
    /// A malformed `requested` string never satisfies the gate.
    #[must_use]
    pub fn satisfies_version(&self, requested: &str) -> bool {
        let Ok(req) = VersionReq::parse(&format!("^{requested}")) else {
            return false;
        };
        req.matches(&self.version)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`ServiceDefinition`]. Later declarations of the same method
/// or event name replace earlier ones.
#[derive(Debug)]
pub struct ServiceDefinitionBuilder {
    name: String,
    version: Version,
    methods: HashMap<String, MethodSpec>,
    events: HashMap<String, DeliveryGuarantee>,
    handled_patterns: Vec<String>,
}

impl ServiceDefinitionBuilder {
    /// Declares a query method.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.methods
            .insert(name.into(), MethodSpec { kind: MethodKind::Query, deprecation: None });
        self
    }

    /// Declares a mutation method.
    #[must_use]
    pub fn mutation(mut self, name: impl Into<String>) -> Self {
        self.methods
            .insert(name.into(), MethodSpec { kind: MethodKind::Mutation, deprecation: None });
        self
    }

    /// Marks an already-declared method as deprecated.
    ///
    /// Unknown method names are ignored; the definition stays consistent
    /// with what was actually declared.
    #[must_use]
    pub fn deprecate(mut self, name: &str, deprecation: Deprecation) -> Self {
        if let Some(spec) = self.methods.get_mut(name) {
            spec.deprecation = Some(deprecation);
        }
        self
    }

    /// Declares an emittable event type with its delivery guarantee.
    #[must_use]
    pub fn emits(mut self, event_type: impl Into<String>, guarantee: DeliveryGuarantee) -> Self {
        self.events.insert(event_type.into(), guarantee);
        self
    }

    /// Declares an event-type pattern this service handles.
    #[must_use]
    pub fn handles(mut self, pattern: impl Into<String>) -> Self {
        self.handled_patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceDefinition {
        ServiceDefinition {
            name: self.name,
            version: self.version,
            methods: self.methods,
            events: self.events,
            handled_patterns: self.handled_patterns,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
