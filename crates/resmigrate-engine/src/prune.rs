//! Duplicate instance pruning
//!
//! Instances of one logical entity are named `<group>.<index>`. Pruning keeps
//! the highest index per group and deletes the rest. The pass is sequential:
//! group bookkeeping is a plain map owned by the pass.
//!
//! Equal indices (e.g. `svc.01` and `svc.1`) are resolved by the greater full
//! name, then the greater resource id, so the survivor does not depend on the
//! order the store returned the instances in.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use resmigrate_common::{ResourceClient, ResourceInstance};
use tracing::{debug, trace, warn};

use crate::error::MigrateError;

static INSTANCE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)\.([0-9]+)$").expect("instance name pattern is a valid regex")
});

/// An instance name split into its group and revision index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    /// Name without the trailing index
    pub group: String,
    /// Revision index, 0 when the name has no numeric suffix
    pub index: u64,
}

/// Split an instance name into group and index
///
/// Names without a `.<digits>` suffix form their own group with index 0.
///
/// # Errors
/// `MalformedName` for an empty name or an index that overflows u64.
pub fn parse_instance_name(name: &str) -> Result<InstanceName, MigrateError> {
    if name.is_empty() {
        return Err(MigrateError::MalformedName {
            name: name.to_string(),
            message: "instance has no name".to_string(),
        });
    }

    let Some(caps) = INSTANCE_NAME.captures(name) else {
        return Ok(InstanceName {
            group: name.to_string(),
            index: 0,
        });
    };

    let index = caps[2].parse::<u64>().map_err(|e| MigrateError::MalformedName {
        name: name.to_string(),
        message: format!("revision index {}: {e}", &caps[2]),
    })?;

    Ok(InstanceName {
        group: caps[1].to_string(),
        index,
    })
}

/// What a pruning pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Surviving instance names, sorted
    pub kept: Vec<String>,
    /// Instances deleted
    pub deleted: Vec<String>,
    /// Instances whose delete call failed
    pub failed_deletes: Vec<String>,
}

impl PruneReport {
    /// Number of delete calls issued
    pub fn delete_attempts(&self) -> usize {
        self.deleted.len() + self.failed_deletes.len()
    }
}

struct Kept {
    resource: ResourceInstance,
    index: u64,
}

fn challenger_wins(current: &Kept, index: u64, challenger: &ResourceInstance) -> bool {
    if index != current.index {
        return index > current.index;
    }
    (challenger.name.as_str(), challenger.metadata.id.as_str())
        > (
            current.resource.name.as_str(),
            current.resource.metadata.id.as_str(),
        )
}

/// Deletes superseded instances through the store client
#[derive(Clone)]
pub struct InstancePruner {
    client: Arc<dyn ResourceClient>,
}

impl InstancePruner {
    /// Create a pruner over a store client
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Keep the newest instance of every group and delete the others
    ///
    /// Delete failures are logged and recorded in the report, never returned.
    ///
    /// # Errors
    /// The first name-parse failure. Only the offending instance is skipped;
    /// the rest of the pass still runs.
    pub async fn prune(&self, instances: Vec<ResourceInstance>) -> Result<PruneReport, MigrateError> {
        let mut report = PruneReport::default();
        let mut keep: HashMap<String, Kept> = HashMap::new();
        let mut first_error = None;

        for instance in instances {
            let parsed = match parse_instance_name(&instance.name) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(instance = %instance.name, error = %e, "skipping instance with unparseable name");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            trace!(
                instance = %instance.name,
                group = %parsed.group,
                index = parsed.index,
                "parsed instance name"
            );

            let wins = match keep.get(&parsed.group) {
                None => true,
                Some(current) => challenger_wins(current, parsed.index, &instance),
            };

            let superseded = if wins {
                keep.insert(
                    parsed.group,
                    Kept {
                        resource: instance,
                        index: parsed.index,
                    },
                )
                .map(|previous| previous.resource)
            } else {
                Some(instance)
            };

            if let Some(stale) = superseded {
                self.delete(stale, &mut report).await;
            }
        }

        report.kept = keep.into_values().map(|k| k.resource.name).collect();
        report.kept.sort();

        debug!(
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            failed = report.failed_deletes.len(),
            "pruned instances"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn delete(&self, instance: ResourceInstance, report: &mut PruneReport) {
        trace!(instance = %instance.name, "removing superseded instance");
        match self.client.delete(&instance).await {
            Ok(()) => report.deleted.push(instance.name),
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "failed to delete superseded instance");
                report.failed_deletes.push(instance.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rand::seq::SliceRandom;
    use resmigrate_common::{Error, MockResourceClient};

    fn instances(group: &str, count: u64) -> Vec<ResourceInstance> {
        (1..=count)
            .map(|i| ResourceInstance::new("APIServiceInstance", &format!("{group}.{i}"), "prod"))
            .collect()
    }

    fn recording_client(deleted: Arc<Mutex<Vec<String>>>) -> MockResourceClient {
        let mut mock = MockResourceClient::new();
        mock.expect_delete().returning(move |ri| {
            deleted.lock().unwrap().push(ri.name.clone());
            Ok(())
        });
        mock
    }

    #[test]
    fn test_parse_instance_name() {
        assert_eq!(
            parse_instance_name("petstore.10").unwrap(),
            InstanceName { group: "petstore".to_string(), index: 10 }
        );
        assert_eq!(
            parse_instance_name("api.v2.stage-1.3").unwrap(),
            InstanceName { group: "api.v2.stage-1".to_string(), index: 3 }
        );
        assert_eq!(
            parse_instance_name("petstore").unwrap(),
            InstanceName { group: "petstore".to_string(), index: 0 }
        );
        assert_eq!(parse_instance_name("petstore.v2").unwrap().index, 0);
        assert_eq!(parse_instance_name("petstore.").unwrap().group, "petstore.");
    }

    #[test]
    fn test_parse_instance_name_malformed() {
        assert!(matches!(
            parse_instance_name(""),
            Err(MigrateError::MalformedName { .. })
        ));
        assert!(matches!(
            parse_instance_name("svc.99999999999999999999999"),
            Err(MigrateError::MalformedName { .. })
        ));
    }

    #[tokio::test]
    async fn test_keeps_highest_index_regardless_of_order() {
        let mut list = instances("svc", 10);
        list.shuffle(&mut rand::thread_rng());

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let pruner = InstancePruner::new(Arc::new(recording_client(deleted.clone())));
        let report = pruner.prune(list).await.unwrap();

        assert_eq!(report.kept, vec!["svc.10".to_string()]);
        assert_eq!(report.deleted.len(), 9);
        assert_eq!(deleted.lock().unwrap().len(), 9);
        assert!(!deleted.lock().unwrap().contains(&"svc.10".to_string()));
    }

    #[tokio::test]
    async fn test_groups_are_pruned_independently() {
        let mut list: Vec<_> = instances("stageA", 5)
            .into_iter()
            .zip(instances("stageB", 5))
            .flat_map(|(a, b)| [a, b])
            .collect();
        list.shuffle(&mut rand::thread_rng());

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let pruner = InstancePruner::new(Arc::new(recording_client(deleted.clone())));
        let report = pruner.prune(list).await.unwrap();

        assert_eq!(report.kept, vec!["stageA.5".to_string(), "stageB.5".to_string()]);
        assert_eq!(report.delete_attempts(), 8);
        assert_eq!(deleted.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_unsuffixed_name_joins_its_group_at_index_zero() {
        let list = vec![
            ResourceInstance::new("APIServiceInstance", "svc", "prod"),
            ResourceInstance::new("APIServiceInstance", "svc.1", "prod"),
            ResourceInstance::new("APIServiceInstance", "other", "prod"),
        ];

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let pruner = InstancePruner::new(Arc::new(recording_client(deleted.clone())));
        let report = pruner.prune(list).await.unwrap();

        assert_eq!(report.kept, vec!["other".to_string(), "svc.1".to_string()]);
        assert_eq!(*deleted.lock().unwrap(), vec!["svc".to_string()]);
    }

    #[tokio::test]
    async fn test_equal_index_survivor_is_order_independent() {
        for names in [["svc.01", "svc.1"], ["svc.1", "svc.01"]] {
            let list = names
                .iter()
                .map(|n| ResourceInstance::new("APIServiceInstance", n, "prod"))
                .collect();

            let deleted = Arc::new(Mutex::new(Vec::new()));
            let pruner = InstancePruner::new(Arc::new(recording_client(deleted.clone())));
            let report = pruner.prune(list).await.unwrap();

            assert_eq!(report.kept, vec!["svc.1".to_string()]);
            assert_eq!(*deleted.lock().unwrap(), vec!["svc.01".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_delete_failures_are_recorded_not_returned() {
        let mut mock = MockResourceClient::new();
        mock.expect_delete().times(4).returning(|ri| {
            if ri.name == "svc.2" {
                Err(Error::store("delete", &ri.name, "500 internal"))
            } else {
                Ok(())
            }
        });

        let pruner = InstancePruner::new(Arc::new(mock));
        let report = pruner.prune(instances("svc", 5)).await.unwrap();

        assert_eq!(report.kept, vec!["svc.5".to_string()]);
        assert_eq!(report.failed_deletes, vec!["svc.2".to_string()]);
        assert_eq!(report.deleted.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_name_is_skipped_and_surfaced() {
        let mut list = instances("svc", 3);
        list.insert(1, ResourceInstance::new("APIServiceInstance", "svc.99999999999999999999999", "prod"));

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let pruner = InstancePruner::new(Arc::new(recording_client(deleted.clone())));
        let result = pruner.prune(list).await;

        assert!(matches!(result, Err(MigrateError::MalformedName { .. })));
        // the rest of the group was still pruned
        assert_eq!(deleted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_instances() {
        let mut mock = MockResourceClient::new();
        mock.expect_delete().never();

        let pruner = InstancePruner::new(Arc::new(mock));
        let report = pruner.prune(Vec::new()).await.unwrap();
        assert_eq!(report, PruneReport::default());
    }
}
