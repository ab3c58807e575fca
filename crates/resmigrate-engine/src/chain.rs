//! Migrator contract and chaining
//!
//! A [`MigrationChain`] runs one resource through an ordered list of
//! migrators. A failing migrator does not stop the chain: the next one runs
//! against the resource the failing step handed back, and the last error is
//! returned to the caller together with the final resource.

use std::sync::Arc;

use async_trait::async_trait;
use resmigrate_common::{ResourceInstance, MIGRATION_COMPLETED};
use tracing::{debug, warn};

use crate::attributes::AttributeMigration;
use crate::context::MigrationContext;
use crate::error::MigrationFailure;
use crate::instances::InstanceMigration;
use crate::relocate::RelocationRules;

/// A check-then-transform-then-mark migration for one resource kind
///
/// Implementations decide whether they apply (by kind) and whether they
/// already ran (by marker) without any store I/O.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Name used in logs and markers
    fn name(&self) -> &'static str;

    /// Migrate a resource, returning it with this migrator's marker set
    async fn migrate(&self, resource: ResourceInstance) -> Result<ResourceInstance, MigrationFailure>;
}

/// Whether the x-agent-details marker for `migration` reads completed
///
/// A malformed marker counts as not completed.
pub fn is_migration_completed(resource: &ResourceInstance, migration: &str) -> bool {
    matches!(
        resource.agent_details_value(migration),
        Ok(Some(value)) if value == MIGRATION_COMPLETED
    )
}

/// Ordered list of migrators
#[derive(Default)]
pub struct MigrationChain {
    migrators: Vec<Arc<dyn Migrator>>,
}

impl MigrationChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard service migrations
    ///
    /// Attribute migration runs first: it treats relocated x-agent-details as
    /// already migrated, and instance migration writes its marker there.
    pub fn standard(ctx: MigrationContext, rules: Arc<RelocationRules>) -> Self {
        Self::new()
            .with(AttributeMigration::new(ctx.clone(), rules))
            .with(InstanceMigration::new(ctx))
    }

    /// Append a migrator
    pub fn with(mut self, migrator: impl Migrator + 'static) -> Self {
        self.migrators.push(Arc::new(migrator));
        self
    }

    /// Number of migrators
    pub fn len(&self) -> usize {
        self.migrators.len()
    }

    /// Whether the chain has no migrators
    pub fn is_empty(&self) -> bool {
        self.migrators.is_empty()
    }

    /// Run `resource` through every migrator in order
    ///
    /// # Errors
    /// The last migrator failure, carrying the resource returned by the final step.
    pub async fn migrate(
        &self,
        resource: ResourceInstance,
    ) -> Result<ResourceInstance, MigrationFailure> {
        let mut current = resource;
        let mut last_error = None;

        for migrator in &self.migrators {
            match migrator.migrate(current).await {
                Ok(next) => current = next,
                Err(failure) => {
                    warn!(
                        migration = migrator.name(),
                        resource = %failure.resource.name,
                        error = %failure.error,
                        "migration failed, continuing chain"
                    );
                    current = failure.resource;
                    last_error = Some(failure.error);
                }
            }
        }

        match last_error {
            Some(error) => Err(MigrationFailure {
                resource: current,
                error,
            }),
            None => {
                debug!(resource = %current.name, migrations = self.len(), "migration chain finished");
                Ok(current)
            }
        }
    }
}
