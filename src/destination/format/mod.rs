//! Batch encoding formats.
//!
//! A destination batch is persisted as one object whose bytes are
//! produced here. Every encoder serializes the same five record fields —
//! `Operation`, `Position`, `Payload`, `Key`, `Metadata` — so objects
//! stay schema-stable across batches.

pub mod json;
pub mod parquet;

use crate::error::SerdeError;
use crate::record::Record;

/// The format a destination batch is persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Newline-delimited JSON, one record per line.
    Json,

    /// Apache Parquet with a fixed five-column schema.
    Parquet,
}

impl Format {
    /// Returns the format name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Parquet => "parquet",
        }
    }

    /// Returns the file extension for objects in this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Parquet => "parquet",
        }
    }

    /// Returns the `Content-Type` for objects in this format.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Parquet => "application/octet-stream",
        }
    }

    /// Encodes a batch of records into object bytes.
    ///
    /// # Errors
    ///
    /// Returns `SerdeError` if encoding fails.
    pub fn encode(&self, records: &[Record]) -> Result<Vec<u8>, SerdeError> {
        match self {
            Format::Json => json::encode(records),
            Format::Parquet => parquet::encode(records),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = SerdeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "parquet" => Ok(Format::Parquet),
            other => Err(SerdeError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
