//! Snapshot iterator: a finite, paginated scan of the bucket.
//!
//! Walks `ListObjectsV2` pages under the configured prefix, fetches each
//! object's body and emits snapshot records. Empty pages are skipped
//! transparently. The iterator tracks the running maximum `last_modified`
//! it has observed; the combined iterator uses that watermark to seed the
//! CDC iterator at handoff.
//!
//! The start position's key is deliberately ignored: a restarted snapshot
//! always begins again at the start of the bucket, which can re-deliver
//! objects after a mid-snapshot restart.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::{ObjectClient, ObjectEntry};
use crate::error::ConnectorError;
use crate::record::{Record, METADATA_CONTENT_TYPE};
use crate::source::position::{Mode, Position};

/// Iterates over every object currently in the bucket.
pub struct SnapshotIterator {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,

    page: VecDeque<ObjectEntry>,
    continuation: Option<String>,
    exhausted: bool,

    // Listing failure observed during has_next, surfaced by the next
    // call to next().
    pending_error: Option<ConnectorError>,

    max_last_modified: DateTime<Utc>,
}

impl SnapshotIterator {
    /// Creates a snapshot iterator. The start position seeds the running
    /// `max_last_modified`; its key plays no role.
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectClient>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        start: &Position,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            page: VecDeque::new(),
            continuation: None,
            exhausted: false,
            pending_error: None,
            max_last_modified: start.timestamp,
        }
    }

    /// The largest `last_modified` seen across all fetched objects.
    #[must_use]
    pub fn max_last_modified(&self) -> DateTime<Utc> {
        self.max_last_modified
    }

    /// Fetches listing pages until one has entries or the listing is
    /// exhausted.
    async fn refresh_page(&mut self) -> Result<(), ConnectorError> {
        while !self.exhausted {
            let page = self
                .client
                .list_objects(&self.bucket, &self.prefix, self.continuation.as_deref())
                .await?;

            self.continuation = page.next_continuation;
            if self.continuation.is_none() {
                self.exhausted = true;
            }

            debug!(
                bucket = %self.bucket,
                entries = page.entries.len(),
                exhausted = self.exhausted,
                "fetched snapshot listing page"
            );

            if !page.entries.is_empty() {
                self.page = page.entries.into();
                break;
            }
        }
        Ok(())
    }

    /// Returns whether another record is available. A listing failure is
    /// remembered and reported by the following `next` call, so this also
    /// returns `true` on failure.
    pub async fn has_next(&mut self) -> bool {
        if self.page.is_empty() && !self.exhausted && self.pending_error.is_none() {
            if let Err(e) = self.refresh_page().await {
                self.pending_error = Some(e);
            }
        }
        !self.page.is_empty() || self.pending_error.is_some()
    }

    /// Produces the next snapshot record.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::BackoffRetry`] once the listing is
    /// exhausted, or the listing/fetch error otherwise.
    pub async fn next(&mut self) -> Result<Record, ConnectorError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if self.page.is_empty() {
            self.refresh_page().await?;
        }
        let Some(entry) = self.page.pop_front() else {
            return Err(ConnectorError::BackoffRetry);
        };

        let object = self.client.get_object(&self.bucket, &entry.key).await?;

        if object.last_modified > self.max_last_modified {
            self.max_last_modified = object.last_modified;
        }

        let position = Position::new(entry.key.clone(), Mode::Snapshot, self.max_last_modified);

        let mut metadata = object.metadata;
        if let Some(content_type) = object.content_type {
            metadata.insert(METADATA_CONTENT_TYPE.to_string(), content_type);
        }

        Ok(Record::snapshot(
            position.serialize(),
            metadata,
            entry.key.into_bytes(),
            object.body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Operation;
    use crate::testing::InMemoryObjectClient;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn seeded_client(n: usize) -> Arc<InMemoryObjectClient> {
        let client = InMemoryObjectClient::new("test-bucket");
        for i in 0..n {
            client.put(
                format!("file{i:04}"),
                format!("body{i}").into_bytes(),
                "text/plain",
                ts(1_634_049_000 + i as i64),
            );
        }
        Arc::new(client)
    }

    #[tokio::test]
    async fn test_emits_every_object_once_in_listing_order() {
        let client = seeded_client(5);
        client.set_page_size(2);
        let mut iter =
            SnapshotIterator::new(client, "test-bucket", "", &Position::default());

        let mut keys = Vec::new();
        while iter.has_next().await {
            let record = iter.next().await.unwrap();
            assert_eq!(record.operation, Operation::Snapshot);
            keys.push(record.key_string());
        }

        assert_eq!(keys, ["file0000", "file0001", "file0002", "file0003", "file0004"]);
    }

    #[tokio::test]
    async fn test_tracks_max_last_modified() {
        let client = seeded_client(3);
        let mut iter =
            SnapshotIterator::new(client, "test-bucket", "", &Position::default());

        while iter.has_next().await {
            iter.next().await.unwrap();
        }
        assert_eq!(iter.max_last_modified(), ts(1_634_049_002));
    }

    #[tokio::test]
    async fn test_start_position_seeds_watermark() {
        let client = seeded_client(1);
        let start = Position::new("", Mode::Snapshot, ts(2_000_000_000));
        let mut iter = SnapshotIterator::new(client, "test-bucket", "", &start);

        assert!(iter.has_next().await);
        iter.next().await.unwrap();
        // Object timestamps are older than the seed, so the seed wins.
        assert_eq!(iter.max_last_modified(), ts(2_000_000_000));
    }

    #[tokio::test]
    async fn test_record_position_carries_key_and_watermark() {
        let client = seeded_client(2);
        let mut iter =
            SnapshotIterator::new(client, "test-bucket", "", &Position::default());

        iter.next().await.unwrap();
        let second = iter.next().await.unwrap();

        let position = Position::parse(&second.position).unwrap();
        assert_eq!(position.mode, Mode::Snapshot);
        assert_eq!(position.key, "file0001");
        assert_eq!(position.timestamp, ts(1_634_049_001));
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let client = InMemoryObjectClient::new("test-bucket");
        client.put("logs/a", b"1".to_vec(), "text/plain", ts(1));
        client.put("data/b", b"2".to_vec(), "text/plain", ts(2));
        client.put("logs/c", b"3".to_vec(), "text/plain", ts(3));

        let mut iter = SnapshotIterator::new(
            Arc::new(client),
            "test-bucket",
            "logs/",
            &Position::default(),
        );

        let mut keys = Vec::new();
        while iter.has_next().await {
            keys.push(iter.next().await.unwrap().key_string());
        }
        assert_eq!(keys, ["logs/a", "logs/c"]);
    }

    #[tokio::test]
    async fn test_empty_bucket_backs_off() {
        let client = Arc::new(InMemoryObjectClient::new("test-bucket"));
        let mut iter =
            SnapshotIterator::new(client, "test-bucket", "", &Position::default());

        assert!(!iter.has_next().await);
        assert!(matches!(
            iter.next().await,
            Err(ConnectorError::BackoffRetry)
        ));
    }

    #[tokio::test]
    async fn test_metadata_carries_content_type_and_user_headers() {
        let client = InMemoryObjectClient::new("test-bucket");
        client
            .put_with_metadata(
                "file0000",
                b"body".to_vec(),
                "application/json",
                ts(10),
                [("owner".to_string(), "tests".to_string())].into(),
            );

        let mut iter = SnapshotIterator::new(
            Arc::new(client),
            "test-bucket",
            "",
            &Position::default(),
        );

        let record = iter.next().await.unwrap();
        assert_eq!(
            record.metadata.get(METADATA_CONTENT_TYPE).map(String::as_str),
            Some("application/json")
        );
        assert_eq!(record.metadata.get("owner").map(String::as_str), Some("tests"));
    }

    #[tokio::test]
    async fn test_listing_error_surfaces_from_next() {
        let client = seeded_client(1);
        client.fail_listings("bucket listing unavailable");
        let mut iter =
            SnapshotIterator::new(client, "test-bucket", "", &Position::default());

        // has_next reports true so the caller collects the error.
        assert!(iter.has_next().await);
        assert!(matches!(
            iter.next().await,
            Err(ConnectorError::ListingFailed(_))
        ));
    }
}
