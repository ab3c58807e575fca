//! Attribute relocation rules
//!
//! Moves selected flat attributes into the x-agent-details sub-resource and
//! drops tags matching removal patterns. Rules are compiled once into an
//! immutable [`RelocationRules`] and shared by reference with every task, so
//! relocation is a pure function of the resource and the rule set.

use std::collections::BTreeSet;

use regex::Regex;
use resmigrate_common::{Error, RelocationSettings, ResourceInstance, X_AGENT_DETAILS};
use serde_json::{Map, Value};

/// Attributes relocated by every migration, before any configured additions
pub const DEFAULT_RELOCATED_ATTRIBUTES: &[&str] = &[
    "prevAPIServiceRevisionID",
    "externalAPIID",
    "externalAPIPrimaryKey",
    "externalAPIName",
    "externalAPIStage",
    "createdBy",
];

/// Compiled relocation rules
#[derive(Debug, Clone)]
pub struct RelocationRules {
    attributes: BTreeSet<String>,
    attribute_patterns: Vec<Regex>,
    tag_patterns: Vec<Regex>,
}

impl Default for RelocationRules {
    fn default() -> Self {
        Self {
            attributes: DEFAULT_RELOCATED_ATTRIBUTES
                .iter()
                .map(|a| a.to_string())
                .collect(),
            attribute_patterns: Vec::new(),
            tag_patterns: Vec::new(),
        }
    }
}

/// Builder for [`RelocationRules`]
#[derive(Debug, Default)]
pub struct RelocationRulesBuilder {
    attributes: Vec<String>,
    attribute_patterns: Vec<String>,
    tag_patterns: Vec<String>,
}

impl RelocationRulesBuilder {
    /// Relocate attributes with exactly these names
    pub fn attr<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Relocate attributes whose name matches any of these patterns
    pub fn attr_pattern<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Drop tags matching any of these patterns
    pub fn tag_pattern<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Compile the rules
    ///
    /// Fails with a configuration error on the first invalid pattern.
    pub fn build(self) -> Result<RelocationRules, Error> {
        let mut rules = RelocationRules::default();
        rules.attributes.extend(self.attributes);
        rules.attribute_patterns = compile("attribute", &self.attribute_patterns)?;
        rules.tag_patterns = compile("tag", &self.tag_patterns)?;
        Ok(rules)
    }
}

fn compile(what: &str, patterns: &[String]) -> Result<Vec<Regex>, Error> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| Error::config(format!("invalid {what} pattern {p:?}: {e}")))
        })
        .collect()
}

/// A resource after relocation, with whether it needs writing back
#[derive(Debug, Clone)]
pub struct Relocation {
    /// The relocated resource
    pub resource: ResourceInstance,
    /// Whether anything changed
    pub update: bool,
}

impl RelocationRules {
    /// Start building a rule set on top of the defaults
    pub fn builder() -> RelocationRulesBuilder {
        RelocationRulesBuilder::default()
    }

    fn should_relocate(&self, attr: &str) -> bool {
        self.attributes.contains(attr) || self.attribute_patterns.iter().any(|re| re.is_match(attr))
    }

    fn should_drop_tag(&self, tag: &str) -> bool {
        self.tag_patterns.iter().any(|re| re.is_match(tag))
    }

    /// Relocate attributes and filter tags in place
    ///
    /// Returns true when at least one attribute moved or one tag was dropped.
    ///
    /// # Errors
    /// A malformed-resource error when attributes have to move but the
    /// existing x-agent-details is not an object. The resource is left as is.
    pub fn apply(&self, resource: &mut ResourceInstance) -> Result<bool, Error> {
        let keys: Vec<String> = resource
            .attributes
            .keys()
            .filter(|k| self.should_relocate(k))
            .cloned()
            .collect();

        let mut update = !keys.is_empty();
        if update {
            let mut details = match resource.sub_resource(X_AGENT_DETAILS) {
                None => Map::new(),
                Some(Value::Object(existing)) => existing.clone(),
                Some(_) => {
                    return Err(Error::malformed(
                        &resource.name,
                        format!("{X_AGENT_DETAILS} is not an object"),
                    ))
                }
            };
            for key in keys {
                if let Some(value) = resource.attributes.remove(&key) {
                    details.insert(key, Value::String(value));
                }
            }
            resource.set_agent_details(details);
        }

        let before = resource.tags.len();
        resource.tags.retain(|t| !self.should_drop_tag(t));
        update |= resource.tags.len() != before;

        Ok(update)
    }

    /// Relocate an owned resource
    pub fn relocate(&self, mut resource: ResourceInstance) -> Result<Relocation, Error> {
        let update = self.apply(&mut resource)?;
        Ok(Relocation { resource, update })
    }
}

impl TryFrom<&RelocationSettings> for RelocationRules {
    type Error = Error;

    fn try_from(settings: &RelocationSettings) -> Result<Self, Self::Error> {
        RelocationRules::builder()
            .attr(settings.attributes.iter().cloned())
            .attr_pattern(settings.attribute_patterns.iter().cloned())
            .tag_pattern(settings.tag_patterns.iter().cloned())
            .build()
    }
}
