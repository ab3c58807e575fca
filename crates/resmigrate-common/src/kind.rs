//! Resource kinds the migrations touch

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kinds of the service resource tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Top-level API service
    ApiService,
    /// Revision of an API service
    ApiServiceRevision,
    /// Deployed instance of a revision
    ApiServiceInstance,
    /// Consumer-facing instance of a service
    ConsumerInstance,
}

impl ResourceKind {
    /// Kind name as used by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiService => "APIService",
            Self::ApiServiceRevision => "APIServiceRevision",
            Self::ApiServiceInstance => "APIServiceInstance",
            Self::ConsumerInstance => "ConsumerInstance",
        }
    }

    /// Plural collection name used in store URLs
    pub fn plural(&self) -> &'static str {
        match self {
            Self::ApiService => "apiservices",
            Self::ApiServiceRevision => "apiservicerevisions",
            Self::ApiServiceInstance => "apiserviceinstances",
            Self::ConsumerInstance => "consumerinstances",
        }
    }

    /// Whether a raw kind string names this kind
    pub fn matches(&self, kind: &str) -> bool {
        self.as_str() == kind
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APIService" => Ok(Self::ApiService),
            "APIServiceRevision" => Ok(Self::ApiServiceRevision),
            "APIServiceInstance" => Ok(Self::ApiServiceInstance),
            "ConsumerInstance" => Ok(Self::ConsumerInstance),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// Plural collection name for a raw kind string
pub fn plural_for(kind: &str) -> Result<&'static str, Error> {
    kind.parse::<ResourceKind>().map(|k| k.plural())
}
