//! Migration configuration
//!
//! Configuration is built once by the caller (from a file via serde, or from
//! the environment) and handed to the engine by reference. Nothing here is
//! process-global.

use serde::Deserialize;

use crate::error::Error;
use crate::kind::ResourceKind;

/// Default page size for store listings
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default number of concurrent tasks per fan-out level
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Trait for reading process environment variables
///
/// Abstracts the environment so configuration parsing can be tested
/// without touching global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of a variable, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// Environment source backed by the real process environment
#[derive(Clone, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Extra relocation rules supplied by configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocationSettings {
    /// Attribute names moved verbatim
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Regular expressions matched against attribute names
    #[serde(default)]
    pub attribute_patterns: Vec<String>,
    /// Regular expressions selecting tags to drop
    #[serde(default)]
    pub tag_patterns: Vec<String>,
}

/// Settings for a migration run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    /// Base URL of the resource store
    #[serde(default)]
    pub url: String,
    /// Environment (scope) the services live in
    #[serde(default)]
    pub environment: String,
    /// Page size for listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum concurrent tasks per fan-out level
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Whether duplicate instances are pruned
    #[serde(default)]
    pub clean_instances: bool,
    /// Extra relocation rules
    #[serde(default)]
    pub relocation: RelocationSettings,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            environment: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            clean_instances: false,
            relocation: RelocationSettings::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a config for a store URL and environment
    pub fn new(url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            environment: environment.into(),
            ..Default::default()
        }
    }

    /// Enable or disable instance pruning
    pub fn with_clean_instances(mut self, enabled: bool) -> Self {
        self.clean_instances = enabled;
        self
    }

    /// Set the per-level concurrency limit
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Read configuration from environment variables
    ///
    /// Reads `MIGRATE_URL`, `MIGRATE_ENVIRONMENT`, `MIGRATE_PAGE_SIZE`,
    /// `MIGRATE_MAX_CONCURRENCY` and `MIGRATE_CLEAN_INSTANCES`. Unset
    /// variables keep their defaults.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(url) = env.var("MIGRATE_URL") {
            config.url = url;
        }
        if let Some(environment) = env.var("MIGRATE_ENVIRONMENT") {
            config.environment = environment;
        }
        if let Some(raw) = env.var("MIGRATE_PAGE_SIZE") {
            config.page_size = parse_usize("MIGRATE_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = env.var("MIGRATE_MAX_CONCURRENCY") {
            config.max_concurrency = parse_usize("MIGRATE_MAX_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = env.var("MIGRATE_CLEAN_INSTANCES") {
            config.clean_instances = parse_bool("MIGRATE_CLEAN_INSTANCES", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the config can drive a migration
    pub fn validate(&self) -> Result<(), Error> {
        if self.url.is_empty() {
            return Err(Error::config("url must be set"));
        }
        if self.environment.is_empty() {
            return Err(Error::config("environment must be set"));
        }
        if self.page_size == 0 {
            return Err(Error::config("page size must be greater than zero"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max concurrency must be greater than zero"));
        }
        Ok(())
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!(
            "{}/apis/management/v1alpha1/environments/{}/{}",
            self.url.trim_end_matches('/'),
            self.environment,
            kind.plural()
        )
    }

    /// Collection URL for API services
    pub fn services_url(&self) -> String {
        self.collection_url(ResourceKind::ApiService)
    }

    /// URL of a single API service
    pub fn service_url(&self, name: &str) -> String {
        format!("{}/{}", self.services_url(), name)
    }

    /// Collection URL for API service revisions
    pub fn revisions_url(&self) -> String {
        self.collection_url(ResourceKind::ApiServiceRevision)
    }

    /// Collection URL for API service instances
    pub fn instances_url(&self) -> String {
        self.collection_url(ResourceKind::ApiServiceInstance)
    }

    /// Collection URL for consumer instances
    pub fn consumer_instances_url(&self) -> String {
        self.collection_url(ResourceKind::ConsumerInstance)
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!("{key} must be a boolean, got {raw:?}"))),
    }
}
