//! Testing utilities for connector implementations.
//!
//! Provides an in-memory, versioned implementation of the
//! [`ObjectClient`] seam plus config helpers, so the iterators, writers
//! and adapters can be exercised without a bucket.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::client::{FetchedObject, ObjectClient, ObjectEntry, ObjectPage, VersionEntry, VersionPage};
use crate::config::{
    ConnectorConfig, CONFIG_KEY_ACCESS_KEY_ID, CONFIG_KEY_BUCKET, CONFIG_KEY_FORMAT,
    CONFIG_KEY_REGION, CONFIG_KEY_SECRET_ACCESS_KEY,
};
use crate::error::ConnectorError;

/// A connector config with credentials, region and the given bucket set.
#[must_use]
pub fn source_test_config(bucket: &str) -> ConnectorConfig {
    let mut config = ConnectorConfig::new();
    config.set(CONFIG_KEY_ACCESS_KEY_ID, "AKIA_TEST");
    config.set(CONFIG_KEY_SECRET_ACCESS_KEY, "test-secret");
    config.set(CONFIG_KEY_REGION, "us-east-1");
    config.set(CONFIG_KEY_BUCKET, bucket);
    config
}

/// A destination config: the source config plus a format.
#[must_use]
pub fn destination_test_config(bucket: &str, format: &str) -> ConnectorConfig {
    let mut config = source_test_config(bucket);
    config.set(CONFIG_KEY_FORMAT, format);
    config
}

/// An object recorded by [`InMemoryObjectClient::put_object`].
#[derive(Debug, Clone)]
pub struct UploadedObject {
    /// Object key.
    pub key: String,

    /// Uploaded bytes.
    pub body: Vec<u8>,

    /// `Content-Type` the upload carried.
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    body: Vec<u8>,
    content_type: String,
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
    delete_marker: bool,
}

#[derive(Debug, Default)]
struct BucketState {
    // BTreeMap so listings come back in lexicographic key order, like a
    // real bucket.
    objects: BTreeMap<String, Vec<StoredVersion>>,
    uploads: Vec<UploadedObject>,
    page_size: usize,
    listing_failure: Option<String>,
}

/// In-memory versioned bucket implementing [`ObjectClient`].
///
/// Every `put`/`delete` appends a version (or delete marker), mirroring a
/// bucket with versioning enabled; the listing calls reconstruct
/// `is_latest` flags and paginate with a controllable page size.
#[derive(Debug)]
pub struct InMemoryObjectClient {
    bucket: String,
    state: Mutex<BucketState>,
}

impl InMemoryObjectClient {
    /// Creates an empty bucket with the given name.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Mutex::new(BucketState {
                page_size: 1000,
                ..BucketState::default()
            }),
        }
    }

    /// Caps listing pages at `page_size` keys, to exercise pagination.
    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().page_size = page_size.max(1);
    }

    /// Makes every subsequent listing call fail with the given message.
    pub fn fail_listings(&self, message: impl Into<String>) {
        self.state.lock().listing_failure = Some(message.into());
    }

    /// Stores a new version of `key`.
    pub fn put(
        &self,
        key: impl Into<String>,
        body: Vec<u8>,
        content_type: &str,
        last_modified: DateTime<Utc>,
    ) {
        self.put_with_metadata(key, body, content_type, last_modified, HashMap::new());
    }

    /// Stores a new version of `key` with user metadata headers.
    pub fn put_with_metadata(
        &self,
        key: impl Into<String>,
        body: Vec<u8>,
        content_type: &str,
        last_modified: DateTime<Utc>,
        metadata: HashMap<String, String>,
    ) {
        self.state
            .lock()
            .objects
            .entry(key.into())
            .or_default()
            .push(StoredVersion {
                body,
                content_type: content_type.to_string(),
                metadata,
                last_modified,
                delete_marker: false,
            });
    }

    /// Appends a delete marker for `key`.
    pub fn delete(&self, key: impl Into<String>, last_modified: DateTime<Utc>) {
        self.state
            .lock()
            .objects
            .entry(key.into())
            .or_default()
            .push(StoredVersion {
                body: Vec::new(),
                content_type: String::new(),
                metadata: HashMap::new(),
                last_modified,
                delete_marker: true,
            });
    }

    /// Everything `put_object` has uploaded, oldest first.
    #[must_use]
    pub fn uploaded(&self) -> Vec<UploadedObject> {
        self.state.lock().uploads.clone()
    }

    fn check_bucket(&self, bucket: &str) -> Result<(), ConnectorError> {
        if bucket == self.bucket {
            Ok(())
        } else {
            Err(ConnectorError::BucketUnavailable {
                bucket: bucket.to_string(),
                message: "no such bucket".into(),
            })
        }
    }

    fn check_listing(&self, state: &BucketState) -> Result<(), ConnectorError> {
        match &state.listing_failure {
            Some(message) => Err(ConnectorError::ListingFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn head_bucket(&self, bucket: &str) -> Result<(), ConnectorError> {
        self.check_bucket(bucket)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, ConnectorError> {
        self.check_bucket(bucket)?;
        let state = self.state.lock();
        self.check_listing(&state)?;

        let eligible: Vec<(&String, &Vec<StoredVersion>)> = state
            .objects
            .iter()
            .filter(|(key, versions)| {
                key.starts_with(prefix)
                    && continuation.map_or(true, |marker| key.as_str() > marker)
                    && versions.last().is_some_and(|v| !v.delete_marker)
            })
            .collect();

        let page: Vec<ObjectEntry> = eligible
            .iter()
            .take(state.page_size)
            .map(|(key, versions)| ObjectEntry {
                key: (*key).clone(),
                last_modified: versions
                    .last()
                    .map(|v| v.last_modified)
                    .unwrap_or_default(),
            })
            .collect();

        let next_continuation = if eligible.len() > page.len() {
            page.last().map(|entry| entry.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            entries: page,
            next_continuation,
        })
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> Result<VersionPage, ConnectorError> {
        self.check_bucket(bucket)?;
        let state = self.state.lock();
        self.check_listing(&state)?;

        let eligible: Vec<(&String, &Vec<StoredVersion>)> = state
            .objects
            .iter()
            .filter(|(key, _)| {
                key.starts_with(prefix) && key_marker.map_or(true, |marker| key.as_str() > marker)
            })
            .collect();

        let mut page = VersionPage::default();
        for (key, versions) in eligible.iter().take(state.page_size) {
            let latest_index = versions.len().saturating_sub(1);
            for (index, version) in versions.iter().enumerate() {
                let entry = VersionEntry {
                    key: (*key).clone(),
                    last_modified: version.last_modified,
                    is_latest: index == latest_index,
                };
                if version.delete_marker {
                    page.delete_markers.push(entry);
                } else {
                    page.versions.push(entry);
                }
            }
        }

        let paged_keys = eligible.len().min(state.page_size);
        if eligible.len() > paged_keys {
            page.is_truncated = true;
            page.next_key_marker = eligible
                .get(paged_keys - 1)
                .map(|(key, _)| (*key).clone());
        }

        Ok(page)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject, ConnectorError> {
        self.check_bucket(bucket)?;
        let state = self.state.lock();

        let version = state
            .objects
            .get(key)
            .and_then(|versions| versions.last())
            .filter(|version| !version.delete_marker)
            .ok_or_else(|| ConnectorError::FetchFailed(format!("no such key: {key}")))?;

        Ok(FetchedObject {
            body: version.body.clone(),
            content_type: Some(version.content_type.clone()),
            metadata: version.metadata.clone(),
            last_modified: version.last_modified,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ConnectorError> {
        self.check_bucket(bucket)?;
        let mut state = self.state.lock();

        state.uploads.push(UploadedObject {
            key: key.to_string(),
            body: body.clone(),
            content_type: content_type.to_string(),
        });
        state
            .objects
            .entry(key.to_string())
            .or_default()
            .push(StoredVersion {
                body,
                content_type: content_type.to_string(),
                metadata: HashMap::new(),
                last_modified: Utc::now(),
                delete_marker: false,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[tokio::test]
    async fn test_listing_paginates_in_key_order() {
        let client = InMemoryObjectClient::new("b");
        client.set_page_size(2);
        for key in ["c", "a", "e", "d", "b"] {
            client.put(key, b"x".to_vec(), "text/plain", ts(1));
        }

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = client
                .list_objects("b", "", continuation.as_deref())
                .await
                .unwrap();
            keys.extend(page.entries.into_iter().map(|e| e.key));
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        assert_eq!(keys, ["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_deleted_keys_vanish_from_flat_listing() {
        let client = InMemoryObjectClient::new("b");
        client.put("keep", b"x".to_vec(), "text/plain", ts(1));
        client.put("drop", b"x".to_vec(), "text/plain", ts(2));
        client.delete("drop", ts(3));

        let page = client.list_objects("b", "", None).await.unwrap();
        let keys: Vec<String> = page.entries.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, ["keep"]);

        assert!(client.get_object("b", "drop").await.is_err());
    }

    #[tokio::test]
    async fn test_version_listing_marks_latest() {
        let client = InMemoryObjectClient::new("b");
        client.put("k", b"v1".to_vec(), "text/plain", ts(1));
        client.put("k", b"v2".to_vec(), "text/plain", ts(2));
        client.delete("k", ts(3));

        let page = client.list_object_versions("b", "", None).await.unwrap();
        assert_eq!(page.versions.len(), 2);
        assert!(page.versions.iter().all(|v| !v.is_latest));
        assert_eq!(page.delete_markers.len(), 1);
        assert!(page.delete_markers[0].is_latest);
    }

    #[tokio::test]
    async fn test_wrong_bucket_is_unavailable() {
        let client = InMemoryObjectClient::new("b");
        assert!(matches!(
            client.head_bucket("nope").await,
            Err(ConnectorError::BucketUnavailable { .. })
        ));
    }
}
