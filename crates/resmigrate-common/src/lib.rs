//! Shared types for resource migrations
//!
//! Provides the pieces every migration needs but none of them own:
//! - [`ResourceInstance`]: typed snapshot of a store resource
//! - [`ResourceClient`]: the store contract the engine consumes
//! - [`MigrationConfig`]: settings handed to the engine at construction
//! - [`Error`]: store, decode, malformed-resource and config errors
//! - [`telemetry`]: tracing subscriber setup

pub mod client;
pub mod config;
pub mod error;
pub mod kind;
pub mod resource;
pub mod telemetry;

pub use client::{query_by_reference_id, query_by_reference_name, ResourceClient};
#[cfg(any(test, feature = "mock"))]
pub use client::MockResourceClient;
pub use config::{EnvSource, MigrationConfig, OsEnv, RelocationSettings};
pub use error::Error;
pub use kind::{plural_for, ResourceKind};
pub use resource::{Metadata, MetadataScope, Reference, ResourceInstance, ResourceMeta};

/// Name of the sub-resource that holds relocated attributes and migration markers
pub const X_AGENT_DETAILS: &str = "x-agent-details";

/// Marker value recorded once a migration has finished for a resource
pub const MIGRATION_COMPLETED: &str = "completed";

/// Marker value recorded while a migration's final write is still in flight
pub const MIGRATION_PENDING: &str = "pending";
