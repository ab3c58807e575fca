//! Typed representation of store resources
//!
//! Store documents are decoded once at the client boundary into
//! [`ResourceInstance`]. Sub-resources live as extra top-level fields in the
//! document, so they are captured with a flattened map and written back the
//! same way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::X_AGENT_DETAILS;

/// Scope a resource lives in (e.g. the environment of an API service)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataScope {
    /// Scope kind (e.g., "Environment")
    #[serde(default)]
    pub kind: String,
    /// Scope name
    #[serde(default)]
    pub name: String,
}

/// Reference from one resource to another
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced resource id
    #[serde(default)]
    pub id: String,
    /// Referenced resource kind
    #[serde(default)]
    pub kind: String,
    /// Referenced resource name
    #[serde(default)]
    pub name: String,
}

/// Store-managed metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Store-assigned id
    #[serde(default)]
    pub id: String,
    /// Owning scope
    #[serde(default)]
    pub scope: MetadataScope,
    /// Resources this one refers to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

/// Identity portion of a resource, used to address sub-resource writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    /// API group
    pub group: String,
    /// API version
    pub api_version: String,
    /// Kind (e.g., "APIService")
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Store metadata
    pub metadata: Metadata,
}

/// A versioned resource snapshot fetched from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInstance {
    /// API group
    #[serde(default)]
    pub group: String,
    /// API version
    #[serde(default)]
    pub api_version: String,
    /// Kind (e.g., "APIService")
    #[serde(default)]
    pub kind: String,
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Display title
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Store metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Flat attribute map
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Tag list
    #[serde(default)]
    pub tags: Vec<String>,
    /// Kind-specific payload, opaque to the engine
    #[serde(default)]
    pub spec: Value,
    /// Named sub-resources, stored as top-level fields of the document
    #[serde(flatten)]
    pub sub_resources: BTreeMap<String, Value>,
}

impl ResourceInstance {
    /// Create a resource of the given kind and name in a scope
    pub fn new(kind: &str, name: &str, scope: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            title: name.to_string(),
            metadata: Metadata {
                scope: MetadataScope {
                    kind: "Environment".to_string(),
                    name: scope.to_string(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set the store id
    pub fn with_id(mut self, id: &str) -> Self {
        self.metadata.id = id.to_string();
        self
    }

    /// Decode a store document
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as a store document
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Identity portion of this resource
    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            group: self.group.clone(),
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Get a sub-resource by name
    pub fn sub_resource(&self, key: &str) -> Option<&Value> {
        self.sub_resources.get(key)
    }

    /// Set a sub-resource, replacing any current value
    pub fn set_sub_resource(&mut self, key: &str, value: Value) {
        self.sub_resources.insert(key.to_string(), value);
    }

    /// All values of the x-agent-details sub-resource
    ///
    /// A sub-resource that is not a JSON object is treated as absent.
    pub fn agent_details(&self) -> Option<&Map<String, Value>> {
        self.sub_resource(X_AGENT_DETAILS)
            .and_then(Value::as_object)
    }

    /// Whether x-agent-details exists and holds at least one key
    pub fn has_agent_details(&self) -> bool {
        self.agent_details().is_some_and(|d| !d.is_empty())
    }

    /// Get a single x-agent-details value as a string
    ///
    /// Returns `None` when the sub-resource or the key is missing. String and
    /// integer values are accepted; anything else is a malformed resource.
    pub fn agent_details_value(&self, key: &str) -> Result<Option<String>, Error> {
        let Some(item) = self.sub_resource(X_AGENT_DETAILS) else {
            return Ok(None);
        };
        let details = item.as_object().ok_or_else(|| {
            Error::malformed(&self.name, format!("{X_AGENT_DETAILS} is not an object"))
        })?;

        match details.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
            Some(other) => Err(Error::malformed(
                &self.name,
                format!(
                    "{X_AGENT_DETAILS} keys should be a string or int, got {} for key {key}",
                    json_type_name(other)
                ),
            )),
        }
    }

    /// Set a key in x-agent-details, creating the sub-resource if absent
    pub fn set_agent_details_key(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let entry = self
            .sub_resources
            .entry(X_AGENT_DETAILS.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        let name = &self.name;
        let details = entry.as_object_mut().ok_or_else(|| {
            Error::malformed(name, format!("{X_AGENT_DETAILS} is not an object"))
        })?;
        details.insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    /// Replace the x-agent-details sub-resource
    pub fn set_agent_details(&mut self, details: Map<String, Value>) {
        self.set_sub_resource(X_AGENT_DETAILS, Value::Object(details));
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
