//! Connector configuration types.
//!
//! Provides the configuration model for both connector sides:
//! - [`ConnectorConfig`]: Key-value configuration with validation
//! - [`ConfigKeySpec`]: Specification for a configuration key
//! - [`S3Config`]: Typed bucket/credential settings shared by source and
//!   destination

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConnectorError;

/// Config key for the AWS access key id.
pub const CONFIG_KEY_ACCESS_KEY_ID: &str = "aws.accessKeyId";

/// Config key for the AWS secret access key.
pub const CONFIG_KEY_SECRET_ACCESS_KEY: &str = "aws.secretAccessKey";

/// Config key for the bucket region.
pub const CONFIG_KEY_REGION: &str = "aws.region";

/// Config key for the bucket name.
pub const CONFIG_KEY_BUCKET: &str = "aws.bucket";

/// Config key for the object key prefix filter.
pub const CONFIG_KEY_PREFIX: &str = "prefix";

/// Config key for the CDC polling period (source only).
pub const CONFIG_KEY_POLLING_PERIOD: &str = "pollingPeriod";

/// Config key for the output format (destination only).
pub const CONFIG_KEY_FORMAT: &str = "format";

/// Default CDC polling period when `pollingPeriod` is not set.
pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(1);

/// Configuration for a connector instance.
///
/// Connectors receive their configuration as a string key-value map,
/// as handed over by the host pipeline definition.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates an empty connector config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from existing properties.
    #[must_use]
    pub fn with_properties(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a required configuration property, returning an error if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key)
            .ok_or_else(|| ConnectorError::MissingConfig(key.to_string()))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.parse::<T>().map(Some).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Gets a duration property parsed from a human-readable string
    /// (`1s`, `500ms`), falling back to `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_duration(
        &self,
        key: &str,
        default: Duration,
    ) -> Result<Duration, ConnectorError> {
        match self.get(key) {
            Some(v) => humantime::parse_duration(v).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(default),
        }
    }

    /// Returns all properties as a reference.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Validates the configuration against a set of key specifications.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` for missing required keys.
    pub fn validate(&self, specs: &[ConfigKeySpec]) -> Result<(), ConnectorError> {
        for spec in specs {
            if spec.required && self.get(&spec.key).is_none() {
                return Err(ConnectorError::MissingConfig(spec.key.clone()));
            }
        }
        Ok(())
    }
}

/// Specification for a configuration key.
///
/// Used by connectors to declare their expected configuration.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// The configuration key name.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Whether this key is required.
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,
}

impl ConfigKeySpec {
    /// Creates a required configuration key spec.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional configuration key spec.
    #[must_use]
    pub fn optional(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets the default value advertised for this key.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Typed bucket and credential settings shared by source and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Static AWS access key id.
    pub access_key_id: String,

    /// Static AWS secret access key.
    pub secret_access_key: String,

    /// Bucket region.
    pub region: String,

    /// Bucket name. The bucket must already exist.
    pub bucket: String,

    /// Object key prefix filter; empty means the whole bucket.
    pub prefix: String,
}

impl S3Config {
    /// The key specs common to both connector sides.
    #[must_use]
    pub fn key_specs() -> Vec<ConfigKeySpec> {
        vec![
            ConfigKeySpec::required(CONFIG_KEY_ACCESS_KEY_ID, "AWS access key id"),
            ConfigKeySpec::required(CONFIG_KEY_SECRET_ACCESS_KEY, "AWS secret access key"),
            ConfigKeySpec::required(CONFIG_KEY_REGION, "bucket region"),
            ConfigKeySpec::required(CONFIG_KEY_BUCKET, "bucket name"),
            ConfigKeySpec::optional(CONFIG_KEY_PREFIX, "object key prefix filter"),
        ]
    }

    /// Parses the shared settings out of a connector config.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if a required key is absent.
    pub fn parse(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        config.validate(&Self::key_specs())?;
        Ok(Self {
            access_key_id: config.require(CONFIG_KEY_ACCESS_KEY_ID)?.to_string(),
            secret_access_key: config.require(CONFIG_KEY_SECRET_ACCESS_KEY)?.to_string(),
            region: config.require(CONFIG_KEY_REGION)?.to_string(),
            bucket: config.require(CONFIG_KEY_BUCKET)?.to_string(),
            prefix: config.get(CONFIG_KEY_PREFIX).unwrap_or_default().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ConnectorConfig {
        let mut config = ConnectorConfig::new();
        config.set(CONFIG_KEY_ACCESS_KEY_ID, "AKIA_TEST");
        config.set(CONFIG_KEY_SECRET_ACCESS_KEY, "secret");
        config.set(CONFIG_KEY_REGION, "us-east-1");
        config.set(CONFIG_KEY_BUCKET, "test-bucket");
        config
    }

    #[test]
    fn test_config_basic_operations() {
        let mut config = ConnectorConfig::new();
        config.set("prefix", "logs/");

        assert_eq!(config.get("prefix"), Some("logs/"));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_config_require() {
        let config = base_config();

        assert!(config.require(CONFIG_KEY_BUCKET).is_ok());
        assert!(matches!(
            config.require("missing"),
            Err(ConnectorError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_config_parsed() {
        let mut config = ConnectorConfig::new();
        config.set("batch.size", "1000");
        config.set("bad_number", "not_a_number");

        let size: Option<usize> = config.get_parsed("batch.size").unwrap();
        assert_eq!(size, Some(1000));

        let missing: Option<usize> = config.get_parsed("missing").unwrap();
        assert_eq!(missing, None);

        let bad: Result<Option<usize>, _> = config.get_parsed("bad_number");
        assert!(bad.is_err());
    }

    #[test]
    fn test_config_duration() {
        let mut config = ConnectorConfig::new();
        config.set(CONFIG_KEY_POLLING_PERIOD, "500ms");

        let period = config
            .get_duration(CONFIG_KEY_POLLING_PERIOD, DEFAULT_POLLING_PERIOD)
            .unwrap();
        assert_eq!(period, Duration::from_millis(500));

        let fallback = config
            .get_duration("missing", DEFAULT_POLLING_PERIOD)
            .unwrap();
        assert_eq!(fallback, Duration::from_secs(1));

        config.set(CONFIG_KEY_POLLING_PERIOD, "soon");
        assert!(config
            .get_duration(CONFIG_KEY_POLLING_PERIOD, DEFAULT_POLLING_PERIOD)
            .is_err());
    }

    #[test]
    fn test_s3_config_parse() {
        let mut config = base_config();
        config.set(CONFIG_KEY_PREFIX, "data/");

        let s3 = S3Config::parse(&config).unwrap();
        assert_eq!(s3.bucket, "test-bucket");
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.prefix, "data/");
    }

    #[test]
    fn test_s3_config_prefix_defaults_empty() {
        let s3 = S3Config::parse(&base_config()).unwrap();
        assert_eq!(s3.prefix, "");
    }

    #[test]
    fn test_s3_config_missing_key() {
        let mut config = base_config();
        config.properties.remove(CONFIG_KEY_BUCKET);

        match S3Config::parse(&config) {
            Err(ConnectorError::MissingConfig(key)) => assert_eq!(key, CONFIG_KEY_BUCKET),
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }
}
