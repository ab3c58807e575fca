//! Error types shared by the store client and the migration engine
//!
//! Store errors carry the operation and target so a failed branch can be
//! traced back to the exact call that produced it.

use thiserror::Error;

/// Errors surfaced by the resource store and the shared resource model
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or store error returned by the client
    #[error("store error during {operation} on {target}: {message}")]
    Store {
        /// Client operation that failed (query, get, update, delete, sub-resource)
        operation: String,
        /// URL, collection or resource name the operation addressed
        target: String,
        /// Message reported by the store
        message: String,
    },

    /// Store payload could not be decoded into a resource
    #[error("decode error: {message}")]
    Decode {
        /// Description of what failed
        message: String,
    },

    /// A resource is missing or carries an unexpected shape for an expected field
    #[error("malformed resource {resource}: {message}")]
    MalformedResource {
        /// Name of the offending resource
        resource: String,
        /// Description of what's wrong
        message: String,
    },

    /// Invalid configuration value
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Kind without a known collection name
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
}

impl Error {
    /// Create a store error for the given operation and target
    pub fn store(
        operation: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed-resource error
    pub fn malformed(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedResource {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the error came from the store rather than from local data
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}
