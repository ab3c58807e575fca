//! Store access shared by all migrators

use std::collections::BTreeMap;
use std::sync::Arc;

use resmigrate_common::{MigrationConfig, ResourceClient, ResourceInstance, X_AGENT_DETAILS};
use tracing::trace;

use crate::error::MigrateError;
use crate::walker::TreeWalker;

/// Client and configuration handed to every migrator
#[derive(Clone)]
pub struct MigrationContext {
    client: Arc<dyn ResourceClient>,
    config: Arc<MigrationConfig>,
}

impl MigrationContext {
    /// Create a context over a store client
    pub fn new(client: Arc<dyn ResourceClient>, config: MigrationConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// The store client
    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    /// The run configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Walker bounded by the configured concurrency
    pub fn walker(&self) -> TreeWalker {
        TreeWalker::new(self.config.max_concurrency)
    }

    /// List every resource in a collection matching `filter`
    pub async fn list(
        &self,
        collection_url: &str,
        filter: &str,
    ) -> Result<Vec<ResourceInstance>, MigrateError> {
        trace!(url = collection_url, filter, "listing resources");
        Ok(self
            .client
            .query(collection_url, filter, self.config.page_size)
            .await?)
    }

    /// Fetch a single resource
    pub async fn get(&self, url: &str) -> Result<ResourceInstance, MigrateError> {
        Ok(self.client.get(url).await?)
    }

    /// Write a resource and then its x-agent-details sub-resource
    ///
    /// The sub-resource write immediately follows the update so that markers
    /// stored in x-agent-details land with the last write of the resource.
    pub async fn update_with_sub_resources(
        &self,
        resource: &ResourceInstance,
    ) -> Result<(), MigrateError> {
        trace!(kind = %resource.kind, name = %resource.name, "updating resource");
        self.client.update(resource).await?;
        self.write_agent_details(resource).await
    }

    /// Write x-agent-details first, then the resource itself
    ///
    /// Used for relocation: a failure between the two calls leaves the flat
    /// attributes in the store next to their relocated copies, so a later run
    /// relocates them again instead of losing them.
    pub async fn write_details_then_update(
        &self,
        resource: &ResourceInstance,
    ) -> Result<(), MigrateError> {
        self.write_agent_details(resource).await?;
        trace!(kind = %resource.kind, name = %resource.name, "updating resource");
        self.client.update(resource).await?;
        Ok(())
    }

    /// Write the x-agent-details sub-resource, if the resource has one
    pub async fn write_agent_details(&self, resource: &ResourceInstance) -> Result<(), MigrateError> {
        let Some(details) = resource.sub_resource(X_AGENT_DETAILS) else {
            return Ok(());
        };
        let subs = BTreeMap::from([(X_AGENT_DETAILS.to_string(), details.clone())]);
        self.client
            .create_or_update_sub_resource(&resource.meta(), &subs)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
