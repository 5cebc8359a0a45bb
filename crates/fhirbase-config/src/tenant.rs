//! Tenant configuration: the one piece of configuration a store needs.
//!
//! A [`TenantConfig`] is validated once, at `Init`, by [`TenantConfig::validate`].
//! After that the only field that may change in place is `channels`, via
//! [`crate::watcher::ConfigWatcher`] reloading the backing file.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use fhirbase_core::{FhirVersion, ResourceType};
use serde::Deserialize;

use crate::ConfigError;

/// Endpoint configuration for a single notification channel (e.g. `rest-hook`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelEndpoint {
    pub endpoint: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// A tenant's immutable identity plus its (hot-reloadable) channel table.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    pub route: String,
    pub base_url: String,
    pub fhir_version: FhirVersion,
    pub enabled_resource_types: HashSet<String>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelEndpoint>,
}

impl TenantConfig {
    /// Parse and validate a tenant configuration from TOML source text.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: TenantConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a tenant configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Checks run once at `Init`: unknown FHIR version, empty enabled-type
    /// set, and unparseable resource type names are configuration errors,
    /// never panics.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route.trim().is_empty() {
            return Err(ConfigError::Validation("route must not be empty".into()));
        }
        if self.enabled_resource_types.is_empty() {
            return Err(ConfigError::Validation(
                "enabled_resource_types must not be empty".into(),
            ));
        }
        for name in &self.enabled_resource_types {
            name.parse::<ResourceType>()
                .map_err(|e| ConfigError::Validation(format!("invalid resource type {name}: {e}")))?;
        }
        Ok(())
    }

    pub fn resource_types(&self) -> Result<HashSet<ResourceType>, ConfigError> {
        self.enabled_resource_types
            .iter()
            .map(|name| {
                name.parse::<ResourceType>()
                    .map_err(|e| ConfigError::Validation(e.to_string()))
            })
            .collect()
    }

    /// Merge a reloaded file's `[channels]` table into this config in place.
    ///
    /// Returns an error naming the offending field if the reload attempted to
    /// change anything other than `channels` — the caller reports this as a
    /// rejected reload rather than applying it.
    pub fn apply_channel_reload(&mut self, reloaded: TenantConfig) -> Result<(), ConfigError> {
        if reloaded.route != self.route
            || reloaded.base_url != self.base_url
            || reloaded.fhir_version != self.fhir_version
            || reloaded.enabled_resource_types != self.enabled_resource_types
        {
            return Err(ConfigError::Validation(
                "reload changed an immutable field (route, base_url, fhir_version, or enabled_resource_types)"
                    .into(),
            ));
        }
        self.channels = reloaded.channels;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "4.3.0"
enabled_resource_types = ["Patient", "Observation", "Encounter"]

[channels.rest-hook]
endpoint = "http://localhost:9000/hook"
"#;

    #[test]
    fn parses_valid_config() {
        let config = TenantConfig::from_toml(BASE).unwrap();
        assert_eq!(config.route, "default");
        assert_eq!(config.fhir_version, FhirVersion::R4B);
        assert!(config.channels.contains_key("rest-hook"));
    }

    #[test]
    fn rejects_empty_resource_type_set() {
        let toml = r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "4.3.0"
enabled_resource_types = []
"#;
        assert!(TenantConfig::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_unknown_fhir_version() {
        let toml = r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "9.9.9"
enabled_resource_types = ["Patient"]
"#;
        assert!(TenantConfig::from_toml(toml).is_err());
    }

    #[test]
    fn channel_reload_updates_channels_only() {
        let mut config = TenantConfig::from_toml(BASE).unwrap();
        let reloaded = TenantConfig::from_toml(
            r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "4.3.0"
enabled_resource_types = ["Patient", "Observation", "Encounter"]

[channels.rest-hook]
endpoint = "http://localhost:9001/hook"
"#,
        )
        .unwrap();
        config.apply_channel_reload(reloaded).unwrap();
        assert_eq!(
            config.channels["rest-hook"].endpoint,
            "http://localhost:9001/hook"
        );
    }

    #[test]
    fn channel_reload_rejects_resource_type_change() {
        let mut config = TenantConfig::from_toml(BASE).unwrap();
        let reloaded = TenantConfig::from_toml(
            r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "4.3.0"
enabled_resource_types = ["Patient"]
"#,
        )
        .unwrap();
        assert!(config.apply_channel_reload(reloaded).is_err());
    }
}
