//! Destination connector: sinks record batches back into a bucket.

pub mod format;
pub mod writer;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::{ObjectClient, S3ObjectClient};
use crate::config::{ConfigKeySpec, ConnectorConfig, S3Config, CONFIG_KEY_FORMAT};
use crate::connector::SinkConnector;
use crate::destination::format::Format;
use crate::destination::writer::{Batch, S3Writer, Writer};
use crate::error::ConnectorError;
use crate::health::HealthStatus;
use crate::metrics::ConnectorMetrics;
use crate::record::Record;

/// Parsed destination-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Bucket and credential settings.
    pub s3: S3Config,

    /// Format batches are persisted in.
    pub format: Format,
}

impl DestinationConfig {
    /// The key specs the destination recognizes.
    #[must_use]
    pub fn key_specs() -> Vec<ConfigKeySpec> {
        let mut specs = S3Config::key_specs();
        specs.push(ConfigKeySpec::required(
            CONFIG_KEY_FORMAT,
            "output format, one of: json, parquet",
        ));
        specs
    }

    /// Parses the destination configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` for missing keys or an unsupported
    /// `format`.
    pub fn parse(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let format = config
            .require(CONFIG_KEY_FORMAT)?
            .parse::<Format>()
            .map_err(ConnectorError::from)?;
        Ok(Self {
            s3: S3Config::parse(config)?,
            format,
        })
    }
}

/// The S3 destination connector.
///
/// Buffer-free by design: every `write` call persists the records it was
/// handed as exactly one object, so batch sizing stays under the host's
/// control.
pub struct S3Destination {
    config: Option<DestinationConfig>,
    client: Option<Arc<dyn ObjectClient>>,
    writer: Option<Box<dyn Writer>>,
    metrics: ConnectorMetrics,
}

impl S3Destination {
    /// Creates an unconfigured destination that will connect to S3 on
    /// `open`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            client: None,
            writer: None,
            metrics: ConnectorMetrics::new(),
        }
    }

    /// Creates a destination bound to the given client instead of
    /// connecting to S3. Used by tests.
    #[must_use]
    pub fn with_client(client: Arc<dyn ObjectClient>) -> Self {
        Self {
            config: None,
            client: Some(client),
            writer: None,
            metrics: ConnectorMetrics::new(),
        }
    }

    /// Names of the objects written so far, oldest first.
    #[must_use]
    pub fn written_objects(&self) -> &[String] {
        self.writer
            .as_ref()
            .map(|writer| writer.written_objects())
            .unwrap_or_default()
    }
}

impl Default for S3Destination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkConnector for S3Destination {
    fn configure(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError> {
        self.config = Some(DestinationConfig::parse(config)?);
        Ok(())
    }

    async fn open(&mut self) -> Result<(), ConnectorError> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| ConnectorError::Internal("open called before configure".into()))?;

        let client: Arc<dyn ObjectClient> = match &self.client {
            Some(client) => Arc::clone(client),
            None => Arc::new(S3ObjectClient::connect(&config.s3).await),
        };

        client.head_bucket(&config.s3.bucket).await?;

        info!(
            bucket = %config.s3.bucket,
            prefix = %config.s3.prefix,
            format = %config.format,
            "opening destination"
        );

        self.writer = Some(Box::new(S3Writer::new(
            Arc::clone(&client),
            config.s3.bucket.clone(),
            config.s3.prefix.clone(),
        )));
        self.client = Some(client);
        Ok(())
    }

    async fn write(&mut self, records: Vec<Record>) -> Result<usize, ConnectorError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ConnectorError::Internal("write called before configure".into()))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ConnectorError::Internal("write called before open".into()))?;

        let count = records.len();
        let batch = Batch {
            records,
            format: config.format,
        };
        let bytes = writer.write(&batch).await?;
        self.metrics.record_object(count as u64, bytes);
        Ok(count)
    }

    fn health_check(&self) -> HealthStatus {
        if self.writer.is_some() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }

    fn metrics(&self) -> ConnectorMetrics {
        self.metrics.clone()
    }

    async fn teardown(&mut self) -> Result<(), ConnectorError> {
        self.writer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerdeError;
    use crate::testing::{destination_test_config, InMemoryObjectClient};

    #[test]
    fn test_configure_requires_format() {
        let mut config = destination_test_config("b", "json");
        config.set(CONFIG_KEY_FORMAT, "");

        let mut destination = S3Destination::new();
        assert!(matches!(
            destination.configure(&config),
            Err(ConnectorError::Serde(SerdeError::UnsupportedFormat(_)))
        ));
    }

    #[test]
    fn test_configure_parses_format() {
        let mut destination = S3Destination::new();
        destination
            .configure(&destination_test_config("b", "parquet"))
            .unwrap();
        assert_eq!(destination.config.unwrap().format, Format::Parquet);
    }

    #[tokio::test]
    async fn test_open_checks_bucket() {
        let client = Arc::new(InMemoryObjectClient::new("other"));
        let mut destination = S3Destination::with_client(client);
        destination
            .configure(&destination_test_config("b", "json"))
            .unwrap();

        assert!(matches!(
            destination.open().await,
            Err(ConnectorError::BucketUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_reports_full_count() {
        let client = Arc::new(InMemoryObjectClient::new("b"));
        let mut destination = S3Destination::with_client(Arc::clone(&client) as Arc<dyn crate::client::ObjectClient>);
        destination
            .configure(&destination_test_config("b", "json"))
            .unwrap();
        destination.open().await.unwrap();

        let records = vec![
            Record::create(b"p1".to_vec(), Default::default(), b"k1".to_vec(), b"v1".to_vec()),
            Record::delete(b"p2".to_vec(), Default::default(), b"k2".to_vec()),
        ];
        let written = destination.write(records).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(client.uploaded().len(), 1);
        assert_eq!(destination.written_objects().len(), 1);
        assert_eq!(destination.metrics().records_total, 2);
        assert_eq!(destination.metrics().objects_total, 1);
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut destination = S3Destination::new();
        destination
            .configure(&destination_test_config("b", "json"))
            .unwrap();
        assert!(matches!(
            destination.write(Vec::new()).await,
            Err(ConnectorError::Internal(_))
        ));
    }
}
