//! Error types for migration runs

use resmigrate_common::{Error, ResourceInstance};

/// Errors from migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Store, decode or resource-model error
    #[error(transparent)]
    Common(#[from] Error),

    /// Instance name could not be parsed into a group and index
    #[error("cannot parse instance name {name:?}: {message}")]
    MalformedName {
        /// Offending resource name
        name: String,
        /// What went wrong
        message: String,
    },

    /// A fan-out task panicked or was aborted before reporting a result
    #[error("task failed in {context}: {message}")]
    Task {
        /// Fan-out level the task belonged to
        context: String,
        /// Join error description
        message: String,
    },

    /// At least one task of a fan-out level failed
    ///
    /// Carries the first failure in input order. Failures are logged by the
    /// level they originate in.
    #[error("{failed} of {total} {level} failed, first at index {index}: {first}")]
    Fanout {
        /// Fan-out level
        level: String,
        /// Number of failed tasks
        failed: usize,
        /// Number of tasks in the level
        total: usize,
        /// Input position of the first failure
        index: usize,
        /// The first failure
        first: Box<MigrateError>,
    },
}

impl MigrateError {
    /// The error that started a failure, looking through fan-out levels
    pub fn root_cause(&self) -> &MigrateError {
        let mut current = self;
        while let Self::Fanout { first, .. } = current {
            current = first;
        }
        current
    }

    /// Whether the error came from a store call
    pub fn is_store(&self) -> bool {
        matches!(self.root_cause(), Self::Common(e) if e.is_store())
    }
}

/// Outcome of a failed migrator: the resource to continue with plus the error
///
/// The resource is the input (or a partially updated copy); its completion
/// marker is never set when a migrator fails.
#[derive(Debug)]
pub struct MigrationFailure {
    /// Resource to hand to the next migrator
    pub resource: ResourceInstance,
    /// Why the migrator failed
    pub error: MigrateError,
}

impl MigrationFailure {
    /// Pair a resource with an error
    pub fn new(resource: ResourceInstance, error: impl Into<MigrateError>) -> Self {
        Self {
            resource,
            error: error.into(),
        }
    }
}

impl std::fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "migration of {} failed: {}", self.resource.name, self.error)
    }
}

impl std::error::Error for MigrationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
