//! Application configuration
//!
//! The attribute names the connector watches. Defaults match the markup
//! conventions used throughout the docs; all fields can be overridden
//! from JSON.

use serde::Deserialize;

use crate::naming::is_valid_token;
use crate::{Error, Result};

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attribute declaring hosts (`data-connect="dropdown tabs"`)
    pub controller_attribute: String,
    /// Attribute declaring targets (`data-connect="dropdown.menu"`)
    pub target_attribute: String,
    /// Attribute declaring actions (`data-handler="click->dropdown#toggle"`)
    pub action_attribute: String,
    /// Scope marker written onto hosts
    pub scope_attribute: String,
    /// Prefix of property and parameter attributes (`data-` + `dropdown.open`)
    pub attribute_prefix: String,
    /// Tags `<{prefix}{token}>` declare a host for `token`
    pub custom_element_prefix: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller_attribute: "data-connect".to_string(),
            target_attribute: "data-connect".to_string(),
            action_attribute: "data-handler".to_string(),
            scope_attribute: "data-scope".to_string(),
            attribute_prefix: "data-".to_string(),
            custom_element_prefix: None,
        }
    }
}

impl Config {
    /// Parse a JSON configuration; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the attribute names can coexist
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("controller_attribute", &self.controller_attribute),
            ("target_attribute", &self.target_attribute),
            ("action_attribute", &self.action_attribute),
            ("scope_attribute", &self.scope_attribute),
        ] {
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_ascii_uppercase()) {
                return Err(Error::Config(format!("{field} `{value}` is not a valid attribute name")));
            }
        }

        if self.action_attribute == self.controller_attribute || self.action_attribute == self.target_attribute {
            return Err(Error::Config(
                "action_attribute must differ from the host and target attributes".to_string(),
            ));
        }
        if [&self.controller_attribute, &self.target_attribute, &self.action_attribute]
            .contains(&&self.scope_attribute)
        {
            return Err(Error::Config("scope_attribute must not be a declaration attribute".to_string()));
        }
        if self.attribute_prefix.chars().any(|c| c.is_whitespace() || c.is_ascii_uppercase()) {
            return Err(Error::Config(format!(
                "attribute_prefix `{}` is not a valid attribute prefix",
                self.attribute_prefix
            )));
        }
        if let Some(prefix) = &self.custom_element_prefix {
            let sample = format!("{prefix}x");
            if prefix.is_empty() || !is_valid_token(&sample) {
                return Err(Error::Config(format!("custom_element_prefix `{prefix}` is not a valid tag prefix")));
            }
        }
        Ok(())
    }

    /// Attribute names the structural observer filters on
    pub(crate) fn observed_attributes(&self) -> Vec<String> {
        let mut names = vec![self.controller_attribute.clone()];
        for name in [&self.target_attribute, &self.action_attribute] {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Full attribute name for a property or parameter key: `data-` + `token.key`
    pub(crate) fn scoped_attribute(&self, token: &str, key: &str) -> String {
        format!("{}{token}.{key}", self.attribute_prefix)
    }
}
