//! Core connector traits.
//!
//! Defines the async lifecycle traits implemented by the two connector
//! sides:
//! - `SourceConnector`: Streams records out of an external system
//! - `SinkConnector`: Writes record batches into an external system
//!
//! The host runtime drives these hooks; the connectors themselves never
//! retry — transient errors surface to the host, which decides whether to
//! retry the call or fail the pipeline.

use async_trait::async_trait;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::health::HealthStatus;
use crate::metrics::ConnectorMetrics;
use crate::record::Record;

/// Trait for source connectors that stream records out of an external
/// system.
///
/// # Lifecycle
///
/// 1. `configure()` - Parse and validate configuration
/// 2. `open(position)` - Connect and prepare to resume from a position
/// 3. `read()` - Produce records one at a time, in a loop
/// 4. `ack(position)` - Called once a record is durably delivered
/// 5. `teardown()` - Clean shutdown
///
/// `read` returns the [`ConnectorError::BackoffRetry`] sentinel when there
/// is presently nothing to emit; the host reschedules the call.
#[async_trait]
pub trait SourceConnector: Send {
    /// Parses and validates the configuration.
    ///
    /// Called once before `open`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required keys are missing or values are
    /// malformed.
    fn configure(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError>;

    /// Opens the connector and prepares to send records starting from the
    /// given position. An empty position means "start from scratch".
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the position is malformed or the
    /// external system is unreachable.
    async fn open(&mut self, position: &[u8]) -> Result<(), ConnectorError>;

    /// Produces the next record.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::BackoffRetry`] when no record is
    /// currently available, or another `ConnectorError` on read failure.
    async fn read(&mut self) -> Result<Record, ConnectorError>;

    /// Acknowledges that the record at `position` was durably delivered.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the acknowledgement cannot be recorded.
    async fn ack(&mut self, position: &[u8]) -> Result<(), ConnectorError>;

    /// Returns the current health status of the connector.
    fn health_check(&self) -> HealthStatus {
        HealthStatus::Unknown
    }

    /// Returns current metrics from the connector.
    fn metrics(&self) -> ConnectorMetrics {
        ConnectorMetrics::default()
    }

    /// Closes the connector and releases all resources.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails.
    async fn teardown(&mut self) -> Result<(), ConnectorError>;
}

/// Trait for sink connectors that write record batches into an external
/// system.
///
/// # Lifecycle
///
/// 1. `configure()` - Parse and validate configuration
/// 2. `open()` - Connect and prepare to receive records
/// 3. `write()` - Persist batches, in a loop
/// 4. `teardown()` - Clean shutdown
#[async_trait]
pub trait SinkConnector: Send {
    /// Parses and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required keys are missing or values are
    /// malformed.
    fn configure(&mut self, config: &ConnectorConfig) -> Result<(), ConnectorError>;

    /// Opens the connector and prepares to receive records.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the external system is unreachable.
    async fn open(&mut self) -> Result<(), ConnectorError>;

    /// Writes a batch of records, returning the number persisted.
    ///
    /// Records keep the order the host passed them in.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on write failure; no partial counts are
    /// reported.
    async fn write(&mut self, records: Vec<Record>) -> Result<usize, ConnectorError>;

    /// Returns the current health status of the connector.
    fn health_check(&self) -> HealthStatus {
        HealthStatus::Unknown
    }

    /// Returns current metrics from the connector.
    fn metrics(&self) -> ConnectorMetrics {
        ConnectorMetrics::default()
    }

    /// Closes the connector and releases all resources.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if cleanup fails.
    async fn teardown(&mut self) -> Result<(), ConnectorError>;
}
