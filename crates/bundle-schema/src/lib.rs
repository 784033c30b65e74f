//! Bundle schema definitions for podscout.
//!
//! This crate defines the collector-supplied snapshot records (read-only
//! inputs to discovery), the parsed unit-file directive model, the
//! `ServiceBundle` aggregates produced by discovery, and the stack
//! artifacts produced by synthesis.

pub mod bundle;
pub mod quadlet;
pub mod snapshot;
pub mod stack;

pub use bundle::{
    AssetKind, BundleAsset, BundleContainerSummary, BundleGraphEdge, BundlePortSummary,
    BundleServiceRef, BundleServiceTemplate, BundleValidation, EdgeReason, ServiceBundle,
    ServiceStatus, Severity, ValidationLevel,
};
pub use quadlet::{QuadletDirectives, UnitSourceType};
pub use snapshot::{EnrichedContainer, NodeSnapshot, PublishedPort, ServiceUnit, WatchedFile};
pub use stack::{BundleStackArtifacts, ContainerRole, StackContainer, VolumeMount};
