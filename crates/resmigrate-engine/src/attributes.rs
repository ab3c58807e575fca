//! Attribute relocation across a service tree
//!
//! The service's revisions, each revision's instances, and the service's
//! consumer instances are relocated concurrently. The service itself is
//! fetched fresh, relocated and marked only once every dependent write has
//! succeeded.
//!
//! Relocated values always reach x-agent-details before the resource update
//! that drops them from the flat attributes. The service goes through a
//! `pending` marker first, so a failed final write is picked up again by the
//! next run.

use std::sync::Arc;

use async_trait::async_trait;
use resmigrate_common::{
    query_by_reference_id, query_by_reference_name, ResourceInstance, ResourceKind,
    MIGRATION_COMPLETED, MIGRATION_PENDING,
};
use tracing::{debug, info, trace};

use crate::chain::Migrator;
use crate::context::MigrationContext;
use crate::error::{MigrateError, MigrationFailure};
use crate::relocate::RelocationRules;
use crate::{ATTRIBUTE_MIGRATION, INSTANCE_MIGRATION};

/// Moves flat attributes of a service and its dependents into x-agent-details
#[derive(Debug, Clone)]
pub struct AttributeMigration {
    ctx: MigrationContext,
    rules: Arc<RelocationRules>,
}

impl AttributeMigration {
    /// Create the migration over a context and a compiled rule set
    pub fn new(ctx: MigrationContext, rules: Arc<RelocationRules>) -> Self {
        Self { ctx, rules }
    }

    async fn run(&self, service: &ResourceInstance) -> Result<ResourceInstance, MigrateError> {
        let (revisions, consumers) = tokio::join!(
            self.migrate_revisions(service),
            self.migrate_consumer_instances(service),
        );
        let revisions = revisions?;
        let consumers = consumers?;
        debug!(service = %service.name, revisions, consumers, "dependents relocated");

        let config = self.ctx.config();
        let mut latest = self.ctx.get(&config.service_url(&service.name)).await?;
        self.rules.apply(&mut latest)?;
        latest.set_agent_details_key(ATTRIBUTE_MIGRATION, MIGRATION_PENDING)?;
        self.ctx.write_details_then_update(&latest).await?;

        latest.set_agent_details_key(ATTRIBUTE_MIGRATION, MIGRATION_COMPLETED)?;
        self.ctx.write_agent_details(&latest).await?;

        Ok(latest)
    }

    async fn migrate_revisions(&self, service: &ResourceInstance) -> Result<usize, MigrateError> {
        let revisions = self
            .ctx
            .list(
                &self.ctx.config().revisions_url(),
                &query_by_reference_id(&service.metadata.id),
            )
            .await?;

        let this = self.clone();
        self.ctx
            .walker()
            .fan_out("revisions", revisions, move |revision| {
                let this = this.clone();
                async move { this.migrate_revision(revision).await }
            })
            .await
    }

    /// Relocate one revision and every instance that references it
    async fn migrate_revision(&self, revision: ResourceInstance) -> Result<(), MigrateError> {
        let instances = self
            .migrate_level(
                "instances",
                self.ctx.config().instances_url(),
                query_by_reference_name(&revision.name),
            )
            .await;
        let written = self.write_relocated(revision).await;

        written?;
        instances.map(|_| ())
    }

    async fn migrate_consumer_instances(
        &self,
        service: &ResourceInstance,
    ) -> Result<usize, MigrateError> {
        self.migrate_level(
            "consumer-instances",
            self.ctx.config().consumer_instances_url(),
            query_by_reference_name(&service.name),
        )
        .await
    }

    /// List a leaf collection and relocate every member
    async fn migrate_level(
        &self,
        level: &'static str,
        url: String,
        filter: String,
    ) -> Result<usize, MigrateError> {
        let resources = self.ctx.list(&url, &filter).await?;

        let this = self.clone();
        self.ctx
            .walker()
            .fan_out(level, resources, move |resource| {
                let this = this.clone();
                async move { this.write_relocated(resource).await }
            })
            .await
    }

    async fn write_relocated(&self, resource: ResourceInstance) -> Result<(), MigrateError> {
        let relocation = self.rules.relocate(resource)?;
        if !relocation.update {
            trace!(kind = %relocation.resource.kind, name = %relocation.resource.name, "nothing to relocate");
            return Ok(());
        }
        self.ctx.write_details_then_update(&relocation.resource).await
    }
}

/// Whether x-agent-details holds anything besides the instance pruning marker
///
/// A service keeps its instance marker even when attribute migration failed
/// on the same run, so that key alone does not count as migrated. A pending
/// attribute marker means the last run stopped before its final write.
fn has_relocated_details(resource: &ResourceInstance) -> bool {
    if matches!(
        resource.agent_details_value(ATTRIBUTE_MIGRATION),
        Ok(Some(value)) if value == MIGRATION_PENDING
    ) {
        return false;
    }
    resource
        .agent_details()
        .is_some_and(|details| details.keys().any(|k| k != INSTANCE_MIGRATION))
}

#[async_trait]
impl Migrator for AttributeMigration {
    fn name(&self) -> &'static str {
        ATTRIBUTE_MIGRATION
    }

    async fn migrate(
        &self,
        resource: ResourceInstance,
    ) -> Result<ResourceInstance, MigrationFailure> {
        if !ResourceKind::ApiService.matches(&resource.kind) {
            return Ok(resource);
        }
        if has_relocated_details(&resource) {
            debug!(service = %resource.name, "agent details present, skipping attribute migration");
            return Ok(resource);
        }

        info!(service = %resource.name, "migrating attributes");
        match self.run(&resource).await {
            Ok(updated) => {
                info!(service = %updated.name, "attribute migration completed");
                Ok(updated)
            }
            Err(e) => Err(MigrationFailure::new(resource, e)),
        }
    }
}
