//! Combined iterator: one stream, snapshot first, then CDC.
//!
//! Starts in the mode the given position dictates and performs the
//! snapshot→CDC handoff exactly once: when the snapshot delivers its last
//! record, that record's position is rewritten to CDC mode (so the
//! caller's next durable checkpoint already resumes as CDC) and a CDC
//! iterator is started from the snapshot's `max_last_modified` watermark.
//! The snapshot handle is dropped after the switch, which also makes the
//! transition idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::client::ObjectClient;
use crate::error::ConnectorError;
use crate::record::Record;
use crate::source::cdc::CdcIterator;
use crate::source::position::{Mode, Position};
use crate::source::snapshot::SnapshotIterator;

/// Multiplexes the snapshot and CDC iterators behind one
/// `has_next`/`next`/`stop` surface.
pub struct CombinedIterator {
    snapshot: Option<SnapshotIterator>,
    cdc: Option<CdcIterator>,

    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,
    polling_period: Duration,
}

impl CombinedIterator {
    /// Creates an iterator resuming from `position`.
    ///
    /// In snapshot mode a non-empty position key is ignored: the snapshot
    /// always restarts from the beginning of the bucket, which may
    /// re-deliver objects after a mid-snapshot restart.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectClient>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        polling_period: Duration,
        position: &Position,
    ) -> Self {
        let bucket = bucket.into();
        let prefix = prefix.into();

        let mut combined = Self {
            snapshot: None,
            cdc: None,
            client,
            bucket,
            prefix,
            polling_period,
        };

        match position.mode {
            Mode::Snapshot => {
                if !position.key.is_empty() {
                    warn!(
                        key = %position.key,
                        "ignoring snapshot position, restarting from the beginning of the bucket"
                    );
                }
                combined.snapshot = Some(SnapshotIterator::new(
                    Arc::clone(&combined.client),
                    combined.bucket.clone(),
                    combined.prefix.clone(),
                    &Position::default(),
                ));
            }
            Mode::Cdc => {
                combined.cdc = Some(CdcIterator::new(
                    Arc::clone(&combined.client),
                    combined.bucket.clone(),
                    combined.prefix.clone(),
                    combined.polling_period,
                    position.timestamp,
                ));
            }
        }

        combined
    }

    /// Returns whether a call to `next` would make progress. An exhausted
    /// (or empty) snapshot triggers the handoff and reports `false` for
    /// this call; subsequent calls poll the CDC iterator.
    pub async fn has_next(&mut self) -> bool {
        if let Some(snapshot) = self.snapshot.as_mut() {
            if snapshot.has_next().await {
                return true;
            }
            // Empty bucket: nothing for the snapshot to deliver, so the
            // handoff happens here instead of on a last record.
            let max = snapshot.max_last_modified();
            self.switch_to_cdc(max);
            return false;
        }
        match &self.cdc {
            Some(cdc) => cdc.has_next(),
            None => false,
        }
    }

    /// Produces the next record from whichever iterator is active.
    ///
    /// # Errors
    ///
    /// Surfaces the active iterator's error verbatim, including the
    /// [`ConnectorError::BackoffRetry`] sentinel.
    pub async fn next(&mut self) -> Result<Record, ConnectorError> {
        if let Some(snapshot) = self.snapshot.as_mut() {
            let mut record = snapshot.next().await?;
            if !snapshot.has_next().await {
                // This is the snapshot's last record: flip its position to
                // CDC mode so the checkpoint resumes on the other side of
                // the handoff.
                let max = snapshot.max_last_modified();
                self.switch_to_cdc(max);
                record.position = Position::to_cdc(&record.position)?;
            }
            return Ok(record);
        }

        match self.cdc.as_mut() {
            Some(cdc) => cdc.next().await,
            None => Err(ConnectorError::Internal("no initialized iterator".into())),
        }
    }

    /// Stops the CDC iterator if one is running. The snapshot iterator
    /// has no background work to stop. Idempotent.
    pub fn stop(&mut self) {
        if let Some(cdc) = self.cdc.as_mut() {
            cdc.stop();
        }
    }

    fn switch_to_cdc(&mut self, max_last_modified: DateTime<Utc>) {
        // A zero watermark means the bucket was empty; detect changes
        // from now on.
        let from = if max_last_modified.timestamp() == 0 {
            Utc::now()
        } else {
            max_last_modified
        };

        info!(%from, bucket = %self.bucket, "snapshot complete, switching to change detection");

        self.cdc = Some(CdcIterator::new(
            Arc::clone(&self.client),
            self.bucket.clone(),
            self.prefix.clone(),
            self.polling_period,
            from,
        ));
        self.snapshot = None;
    }
}
