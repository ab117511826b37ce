//! Runtime configuration for stack compilation

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::identity::{resolve_partition, Partition, UnknownPartition};

/// Default log retention for the service log group
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

/// Errors that can occur when loading a runtime configuration file
#[derive(Error, Debug)]
pub enum RuntimeConfigError {
    #[error("Failed to read runtime config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse runtime config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid runtime config: {0}")]
    Partition(#[from] UnknownPartition),
}

/// Deployment context a stack is compiled for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub partition: Partition,
    pub account_id: String,
    pub region: String,
    /// Extra tags applied to the stack and its taggable resources
    pub additional_tags: BTreeMap<String, String>,
    /// Built image location, takes precedence over the workload's image
    pub image: Option<String>,
    /// URL of a packaged add-ons template to nest into the stack
    pub addons_template_url: Option<String>,
    /// Whether the environment's load balancer has an HTTPS listener
    pub https_listener: bool,
    /// Suffix reused from a previous deployment of the same stack
    pub unique_suffix: Option<String>,
    pub log_retention_days: u32,
}

/// TOML structure for deserializing runtime configs
#[derive(Deserialize)]
struct TomlRuntimeConfig {
    partition: Option<String>,
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    additional_tags: BTreeMap<String, String>,
    image: Option<String>,
    addons_template_url: Option<String>,
    #[serde(default)]
    https_listener: bool,
    unique_suffix: Option<String>,
    log_retention_days: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            partition: Partition::default(),
            account_id: String::new(),
            region: String::new(),
            additional_tags: BTreeMap::new(),
            image: None,
            addons_template_url: None,
            https_listener: false,
            unique_suffix: None,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration for an account and region; the partition is
    /// derived from the region
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            partition: resolve_partition(&region),
            account_id: account_id.into(),
            region,
            ..Self::default()
        }
    }

    /// Load a runtime config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, RuntimeConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load a runtime config from a TOML string
    ///
    /// An explicit `partition` wins; otherwise it is derived from `region`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, RuntimeConfigError> {
        let parsed: TomlRuntimeConfig = toml::from_str(content)?;
        let partition = match parsed.partition {
            Some(p) => p.parse()?,
            None => resolve_partition(&parsed.region),
        };

        Ok(RuntimeConfig {
            partition,
            account_id: parsed.account_id,
            region: parsed.region,
            additional_tags: parsed.additional_tags,
            image: parsed.image,
            addons_template_url: parsed.addons_template_url,
            https_listener: parsed.https_listener,
            unique_suffix: parsed.unique_suffix,
            log_retention_days: parsed.log_retention_days.unwrap_or(DEFAULT_LOG_RETENTION_DAYS),
        })
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_additional_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_addons_template_url(mut self, url: impl Into<String>) -> Self {
        self.addons_template_url = Some(url.into());
        self
    }

    pub fn with_https_listener(mut self, enabled: bool) -> Self {
        self.https_listener = enabled;
        self
    }

    /// Reuse the uniqueness suffix of an earlier deployment
    pub fn with_unique_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.unique_suffix = Some(suffix.into());
        self
    }

    pub fn with_log_retention_days(mut self, days: u32) -> Self {
        self.log_retention_days = days;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_partition() {
        assert_eq!(RuntimeConfig::new("1", "cn-north-1").partition, Partition::AwsCn);
        assert_eq!(RuntimeConfig::new("1", "us-east-1").partition, Partition::Aws);
    }

    #[test]
    fn test_builder_pattern() {
        let config = RuntimeConfig::new("123456789012", "us-west-2")
            .with_https_listener(true)
            .with_additional_tag("owner", "platform")
            .with_unique_suffix("abc")
            .with_log_retention_days(7)
            .with_partition(Partition::AwsCn);

        assert_eq!(config.partition, Partition::AwsCn);
        assert!(config.https_listener);
        assert_eq!(config.additional_tags.get("owner").map(String::as_str), Some("platform"));
        assert_eq!(config.unique_suffix.as_deref(), Some("abc"));
        assert_eq!(config.log_retention_days, 7);
    }

    #[test]
    fn test_parse_toml() {
        let config = RuntimeConfig::from_str(
            r#"
account_id = "123456789012"
region = "cn-northwest-1"
https_listener = true

[additional_tags]
team = "payments"
"#,
        )
        .expect("Should parse");
        assert_eq!(config.partition, Partition::AwsCn);
        assert_eq!(config.log_retention_days, DEFAULT_LOG_RETENTION_DAYS);
        assert_eq!(config.additional_tags.len(), 1);
    }

    #[test]
    fn test_explicit_partition_wins() {
        let config = RuntimeConfig::from_str("region = \"cn-north-1\"\npartition = \"aws\"").unwrap();
        assert_eq!(config.partition, Partition::Aws);
    }

    #[test]
    fn test_unknown_partition_rejected() {
        let result = RuntimeConfig::from_str("partition = \"aws-mars\"");
        assert!(matches!(result, Err(RuntimeConfigError::Partition(_))));
    }
}
