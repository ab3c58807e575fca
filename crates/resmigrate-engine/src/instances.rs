//! Removal of superseded service instances

use async_trait::async_trait;
use resmigrate_common::{query_by_reference_id, ResourceInstance, ResourceKind, MIGRATION_COMPLETED};
use tracing::{debug, info};

use crate::chain::{is_migration_completed, Migrator};
use crate::context::MigrationContext;
use crate::error::{MigrateError, MigrationFailure};
use crate::prune::InstancePruner;
use crate::INSTANCE_MIGRATION;

/// Keeps only the newest instance of every instance group of a service
///
/// Runs only when `clean_instances` is enabled in the configuration.
#[derive(Clone)]
pub struct InstanceMigration {
    ctx: MigrationContext,
    pruner: InstancePruner,
}

impl InstanceMigration {
    /// Create the migration over a context
    pub fn new(ctx: MigrationContext) -> Self {
        let pruner = InstancePruner::new(ctx.client().clone());
        Self { ctx, pruner }
    }

    async fn run(&self, service: &ResourceInstance) -> Result<ResourceInstance, MigrateError> {
        let instances = self
            .ctx
            .list(
                &self.ctx.config().instances_url(),
                &query_by_reference_id(&service.metadata.id),
            )
            .await?;
        debug!(service = %service.name, count = instances.len(), "listed service instances");

        let report = self.pruner.prune(instances).await?;
        info!(
            service = %service.name,
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            failed_deletes = report.failed_deletes.len(),
            "pruned service instances"
        );

        let mut updated = service.clone();
        updated.set_agent_details_key(INSTANCE_MIGRATION, MIGRATION_COMPLETED)?;
        self.ctx.update_with_sub_resources(&updated).await?;
        Ok(updated)
    }
}

#[async_trait]
impl Migrator for InstanceMigration {
    fn name(&self) -> &'static str {
        INSTANCE_MIGRATION
    }

    async fn migrate(
        &self,
        resource: ResourceInstance,
    ) -> Result<ResourceInstance, MigrationFailure> {
        if !ResourceKind::ApiService.matches(&resource.kind) || !self.ctx.config().clean_instances {
            return Ok(resource);
        }
        if is_migration_completed(&resource, INSTANCE_MIGRATION) {
            debug!(service = %resource.name, "instances already pruned");
            return Ok(resource);
        }

        match self.run(&resource).await {
            Ok(updated) => Ok(updated),
            Err(e) => Err(MigrationFailure::new(resource, e)),
        }
    }
}
