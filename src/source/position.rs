//! Resumable position codec.
//!
//! A position is the cursor the host persists between restarts. It carries
//! the mode the source was in (snapshot or CDC), the key of the last
//! delivered object and a second-granularity high-water timestamp.
//!
//! Wire format: `<key>_<modeChar><epochSeconds>`, where the mode char is
//! `s` for snapshot and `c` for CDC. Keys may themselves contain
//! underscores, so parsing splits on the **last** underscore.

use chrono::{DateTime, Utc};

use crate::error::ConnectorError;

/// Which iterator a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Initial full bucket scan.
    #[default]
    Snapshot,

    /// Periodic change detection.
    Cdc,
}

impl Mode {
    fn as_char(self) -> char {
        match self {
            Mode::Snapshot => 's',
            Mode::Cdc => 'c',
        }
    }

    fn from_char(c: char) -> Result<Self, ConnectorError> {
        match c {
            's' => Ok(Mode::Snapshot),
            'c' => Ok(Mode::Cdc),
            other => Err(ConnectorError::InvalidPosition(format!(
                "unknown mode character {other:?}"
            ))),
        }
    }
}

/// A parsed resumable cursor.
///
/// The zero value (empty key, snapshot mode, epoch timestamp) means
/// "start from scratch" and is what an empty persisted position parses to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    /// Key of the last delivered object; empty at the start.
    pub key: String,

    /// Iterator mode the position was taken in.
    pub mode: Mode,

    /// High-water timestamp. In CDC mode this is the `last_modified` of
    /// the last emitted object; in snapshot mode it is the running maximum
    /// `last_modified` observed so far.
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// Creates a position from its parts.
    #[must_use]
    pub fn new(key: impl Into<String>, mode: Mode, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            mode,
            timestamp,
        }
    }

    /// Parses a persisted position. Empty input yields the zero value.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidPosition`] for anything the
    /// serializer could not have produced.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConnectorError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        let s = std::str::from_utf8(bytes)
            .map_err(|_| ConnectorError::InvalidPosition("position is not UTF-8".into()))?;

        let (key, rest) = s.rsplit_once('_').ok_or_else(|| {
            ConnectorError::InvalidPosition(format!("no mode separator in {s:?}"))
        })?;

        let mut chars = rest.chars();
        let mode = Mode::from_char(chars.next().ok_or_else(|| {
            ConnectorError::InvalidPosition(format!("missing mode character in {s:?}"))
        })?)?;

        let seconds: i64 = chars.as_str().parse().map_err(|_| {
            ConnectorError::InvalidPosition(format!("invalid timestamp in {s:?}"))
        })?;
        let timestamp = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            ConnectorError::InvalidPosition(format!("timestamp out of range in {s:?}"))
        })?;

        Ok(Self {
            key: key.to_string(),
            mode,
            timestamp,
        })
    }

    /// Serializes the position into its persisted form.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!(
            "{}_{}{}",
            self.key,
            self.mode.as_char(),
            self.timestamp.timestamp()
        )
        .into_bytes()
    }

    /// Re-encodes a serialized position with the mode set to CDC, leaving
    /// key and timestamp untouched. Used once, on the last record of the
    /// snapshot, so the caller's next durable checkpoint already resumes
    /// in CDC mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidPosition`] if the input does not
    /// parse.
    pub fn to_cdc(bytes: &[u8]) -> Result<Vec<u8>, ConnectorError> {
        let mut position = Self::parse(bytes)?;
        position.mode = Mode::Cdc;
        Ok(position.serialize())
    }
}
