//! One-shot migration of service resource trees
//!
//! Rewrites a service and its dependents to the x-agent-details layout,
//! marks each migration as completed on the service so it never repeats, and
//! prunes superseded service instances.
//!
//! ## Architecture
//!
//! ```text
//! MigrationChain::migrate(service)
//! ├─ AttributeMigration          (skip: x-agent-details non-empty)
//! │  ├─ fan out revisions         metadata.references.id==<service id>
//! │  │  ├─ relocate + write revision
//! │  │  └─ fan out instances      metadata.references.name==<revision name>
//! │  │     └─ relocate + write instance
//! │  ├─ fan out consumer instances metadata.references.name==<service name>
//! │  │  └─ relocate + write consumer instance
//! │  └─ all succeeded:
//! │     get service, relocate, attribute-migration=pending,
//! │     write details, update, attribute-migration=completed, write details
//! └─ InstanceMigration           (skip: clean_instances off or completed)
//!    ├─ list instances            metadata.references.id==<service id>
//!    ├─ prune sequentially, newest index per group survives
//!    └─ instance-migration=completed, write
//! ```
//!
//! Every fan-out level is bounded by its own semaphore and never cancels
//! siblings. Every task runs and a failure is logged where it happens. The
//! first one is returned with its position at every level.
//! A failing migrator hands its input back so the chain can continue.

mod attributes;
mod chain;
mod context;
mod error;
mod instances;
mod prune;
mod relocate;
mod walker;

pub use attributes::AttributeMigration;
pub use chain::{is_migration_completed, MigrationChain, Migrator};
pub use context::MigrationContext;
pub use error::{MigrateError, MigrationFailure};
pub use instances::InstanceMigration;
pub use prune::{parse_instance_name, InstanceName, InstancePruner, PruneReport};
pub use relocate::{
    Relocation, RelocationRules, RelocationRulesBuilder, DEFAULT_RELOCATED_ATTRIBUTES,
};
pub use walker::TreeWalker;

/// Marker key set once a service's attributes have been relocated
pub const ATTRIBUTE_MIGRATION: &str = "attribute-migration";

/// Marker key set once a service's superseded instances have been pruned
pub const INSTANCE_MIGRATION: &str = "instance-migration";
