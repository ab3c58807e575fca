//! Resource store client contract
//!
//! The engine consumes this trait and never implements it. Retries,
//! pagination continuation and authentication belong to the implementation;
//! any error it returns is terminal for the branch that made the call.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::resource::{ResourceInstance, ResourceMeta};

/// Query key for reference-by-id filters
pub const QUERY_BY_REFERENCE_ID: &str = "metadata.references.id";

/// Query key for reference-by-name filters
pub const QUERY_BY_REFERENCE_NAME: &str = "metadata.references.name";

/// Filter matching resources that reference the resource with `id`
pub fn query_by_reference_id(id: &str) -> String {
    format!("{QUERY_BY_REFERENCE_ID}=={id}")
}

/// Filter matching resources that reference a resource named `name`
pub fn query_by_reference_name(name: &str) -> String {
    format!("{QUERY_BY_REFERENCE_NAME}=={name}")
}

/// Trait abstracting resource store operations
///
/// This trait allows mocking the store in tests while the production
/// implementation talks to the API server.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List every resource in a collection matching `filter`
    ///
    /// The implementation follows pagination until the listing is complete.
    async fn query(
        &self,
        collection_url: &str,
        filter: &str,
        page_size: usize,
    ) -> Result<Vec<ResourceInstance>, Error>;

    /// Fetch a single resource by URL
    async fn get(&self, url: &str) -> Result<ResourceInstance, Error>;

    /// Write back a resource, returning the stored version
    async fn update(&self, resource: &ResourceInstance) -> Result<ResourceInstance, Error>;

    /// Create or replace named sub-resources of a resource
    async fn create_or_update_sub_resource(
        &self,
        meta: &ResourceMeta,
        sub_resources: &BTreeMap<String, Value>,
    ) -> Result<(), Error>;

    /// Delete a resource
    async fn delete(&self, resource: &ResourceInstance) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_filters() {
        assert_eq!(query_by_reference_id("svc-1"), "metadata.references.id==svc-1");
        assert_eq!(
            query_by_reference_name("petstore.3"),
            "metadata.references.name==petstore.3"
        );
    }

    #[tokio::test]
    async fn test_mock_client_is_object_safe() {
        let mut mock = MockResourceClient::new();
        mock.expect_get()
            .withf(|url| url == "/apiservices/petstore")
            .times(1)
            .returning(|_| Ok(ResourceInstance::new("APIService", "petstore", "prod")));

        let client: Box<dyn ResourceClient> = Box::new(mock);
        let ri = client.get("/apiservices/petstore").await.unwrap();
        assert_eq!(ri.name, "petstore");
    }
}
