//! Source connector: streams a bucket snapshot followed by a change feed.

pub mod cdc;
pub mod combined;
pub mod position;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::{ObjectClient, S3ObjectClient};
use crate::config::{
    ConfigKeySpec, ConnectorConfig, S3Config, CONFIG_KEY_POLLING_PERIOD, DEFAULT_POLLING_PERIOD,
};
use crate::connector::SourceConnector;
use crate::error::ConnectorError;
use crate::health::HealthStatus;
use crate::metrics::ConnectorMetrics;
use crate::record::Record;
use crate::source::combined::CombinedIterator;
use crate::source::position::Position;

/// Parsed source-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Bucket and credential settings.
    pub s3: S3Config,

    /// CDC poll interval.
    pub polling_period: Duration,
}

impl SourceConfig {
    /// The key specs the source recognizes.
    #[must_use]
    pub fn key_specs() -> Vec<ConfigKeySpec> {
        let mut specs = S3Config::key_specs();
        specs.push(
            ConfigKeySpec::optional(CONFIG_KEY_POLLING_PERIOD, "CDC poll interval")
                .with_default("1s"),
        );
        specs
    }

    /// Parses the source configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` for missing keys or a malformed
    /// `pollingPeriod`.
    pub fn parse(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        Ok(Self {
            s3: S3Config::parse(config)?,
            polling_period: config
                .get_duration(CONFIG_KEY_POLLING_PERIOD, DEFAULT_POLLING_PERIOD)?,
        })
    }
}

/// The S3 source connector.
///
/// Drives a [`CombinedIterator`] behind the host lifecycle: `configure`
/// parses the config, `open` connects and resumes from the persisted
/// position, `read` delivers one record at a time (or the
/// [`ConnectorError::BackoffRetry`] sentinel when idle), and `teardown`
/// stops any background work.
pub struct S3Source {
    config: Option<SourceConfig>,
    client: Option<Arc<dyn ObjectClient>>,
    iterator: Option<CombinedIterator>,
    metrics: ConnectorMetrics,
}

impl S3Source {
    /// Creates an unconfigured source that will connect to S3 on `open`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            client: None,
            iterator: None,
            metrics: ConnectorMetrics::new(),
        }
    }

    /// Creates a source bound to the given client instead of connecting
    /// to S3. Used by tests.
    #[must_use]
    pub fn with_client(client: Arc<dyn ObjectClient>) -> Self {
        Self {
            config: None,
            client: Some(client),
            iterator: None,
            metrics: ConnectorMetrics::new(),
        }
    }
}

impl Default for S3Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceConnector for S3Source {
    fn configure(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError> {
        self.config = Some(SourceConfig::parse(config)?);
        Ok(())
    }

    async fn open(&mut self, position: &[u8]) -> Result<(), ConnectorError> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| ConnectorError::Internal("open called before configure".into()))?;

        let client: Arc<dyn ObjectClient> = match &self.client {
            Some(client) => Arc::clone(client),
            None => Arc::new(S3ObjectClient::connect(&config.s3).await),
        };

        client.head_bucket(&config.s3.bucket).await?;

        let position = Position::parse(position)?;
        info!(
            bucket = %config.s3.bucket,
            prefix = %config.s3.prefix,
            mode = ?position.mode,
            "opening source"
        );

        self.iterator = Some(CombinedIterator::new(
            Arc::clone(&client),
            config.s3.bucket.clone(),
            config.s3.prefix.clone(),
            config.polling_period,
            &position,
        ));
        self.client = Some(client);
        Ok(())
    }

    async fn read(&mut self) -> Result<Record, ConnectorError> {
        let iterator = self
            .iterator
            .as_mut()
            .ok_or_else(|| ConnectorError::Internal("read called before open".into()))?;

        if !iterator.has_next().await {
            return Err(ConnectorError::BackoffRetry);
        }

        let record = iterator.next().await?;
        self.metrics.record(
            record
                .payload
                .after
                .as_ref()
                .map(|body| body.len() as u64)
                .unwrap_or_default(),
        );
        Ok(record)
    }

    async fn ack(&mut self, position: &[u8]) -> Result<(), ConnectorError> {
        // No server-side acknowledgement needed.
        debug!(position = %String::from_utf8_lossy(position), "got ack");
        Ok(())
    }

    fn health_check(&self) -> HealthStatus {
        if self.iterator.is_some() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }

    fn metrics(&self) -> ConnectorMetrics {
        self.metrics.clone()
    }

    async fn teardown(&mut self) -> Result<(), ConnectorError> {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.stop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_KEY_BUCKET;
    use crate::testing::{source_test_config, InMemoryObjectClient};

    #[test]
    fn test_configure_rejects_missing_keys() {
        // Everything but the bucket name.
        let mut config = ConnectorConfig::new();
        config.set(crate::config::CONFIG_KEY_ACCESS_KEY_ID, "AKIA_TEST");
        config.set(crate::config::CONFIG_KEY_SECRET_ACCESS_KEY, "secret");
        config.set(crate::config::CONFIG_KEY_REGION, "us-east-1");

        let mut source = S3Source::new();
        match source.configure(&config) {
            Err(ConnectorError::MissingConfig(key)) => assert_eq!(key, CONFIG_KEY_BUCKET),
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_configure_rejects_bad_polling_period() {
        let mut config = source_test_config("test-bucket");
        config.set(CONFIG_KEY_POLLING_PERIOD, "every-so-often");

        let mut source = S3Source::new();
        assert!(matches!(
            source.configure(&config),
            Err(ConnectorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_polling_period_defaults() {
        let config = source_test_config("test-bucket");
        let parsed = SourceConfig::parse(&config).unwrap();
        assert_eq!(parsed.polling_period, DEFAULT_POLLING_PERIOD);
    }

    #[tokio::test]
    async fn test_open_checks_bucket() {
        let client = Arc::new(InMemoryObjectClient::new("other-bucket"));
        let mut source = S3Source::with_client(client);
        source.configure(&source_test_config("test-bucket")).unwrap();

        assert!(matches!(
            source.open(b"").await,
            Err(ConnectorError::BucketUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_position() {
        let client = Arc::new(InMemoryObjectClient::new("test-bucket"));
        let mut source = S3Source::with_client(client);
        source.configure(&source_test_config("test-bucket")).unwrap();

        assert!(matches!(
            source.open(b"garbage-without-separator").await,
            Err(ConnectorError::InvalidPosition(_))
        ));
    }

    #[tokio::test]
    async fn test_read_before_open_fails() {
        let mut source = S3Source::new();
        assert!(matches!(
            source.read().await,
            Err(ConnectorError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_health() {
        let client = Arc::new(InMemoryObjectClient::new("test-bucket"));
        let mut source = S3Source::with_client(client);
        assert!(!source.health_check().is_healthy());

        source.configure(&source_test_config("test-bucket")).unwrap();
        source.open(b"").await.unwrap();
        assert!(source.health_check().is_healthy());

        source.teardown().await.unwrap();
        assert!(!source.health_check().is_healthy());
    }
}
