//! Object-store client seam.
//!
//! All bucket I/O goes through the [`ObjectClient`] trait so the iterator
//! and writer logic can be exercised against an in-memory bucket (see
//! [`crate::testing`]) while production uses [`S3ObjectClient`] over the
//! AWS SDK. The trait surface is exactly the five calls the connectors
//! need: `HeadBucket`, `ListObjectsV2`, `ListObjectVersions`, `GetObject`
//! and `PutObject`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use crate::config::S3Config;
use crate::error::ConnectorError;

/// One row of a `ListObjectsV2` page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,

    /// Last-modified instant reported by the listing.
    pub last_modified: DateTime<Utc>,
}

/// One page of a `ListObjectsV2` scan.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Entries in server listing order.
    pub entries: Vec<ObjectEntry>,

    /// Continuation token for the next page; `None` when the listing is
    /// exhausted.
    pub next_continuation: Option<String>,
}

/// One row of a `ListObjectVersions` page, covering both current versions
/// and delete markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Object key.
    pub key: String,

    /// Last-modified instant of this version or marker.
    pub last_modified: DateTime<Utc>,

    /// Whether this is the latest version (or latest marker) of the key.
    pub is_latest: bool,
}

/// One page of a `ListObjectVersions` scan.
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    /// Object versions on this page.
    pub versions: Vec<VersionEntry>,

    /// Delete markers on this page.
    pub delete_markers: Vec<VersionEntry>,

    /// Whether more pages follow.
    pub is_truncated: bool,

    /// Key marker to pass for the next page.
    pub next_key_marker: Option<String>,
}

/// An object body together with the headers the connectors care about.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    /// Raw object body.
    pub body: Vec<u8>,

    /// `Content-Type` header, if the store reported one.
    pub content_type: Option<String>,

    /// User metadata headers.
    pub metadata: HashMap<String, String>,

    /// Last-modified instant of the fetched version.
    pub last_modified: DateTime<Utc>,
}

/// The object-store operations used by the connectors.
///
/// Implementations must be safe for concurrent use; the CDC iterator
/// shares one client between its scanner and formatter tasks.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Checks that the bucket exists and is accessible.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::BucketUnavailable`] if it is not.
    async fn head_bucket(&self, bucket: &str) -> Result<(), ConnectorError>;

    /// Fetches one page of the flat object listing under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::ListingFailed`] on failure.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, ConnectorError>;

    /// Fetches one page of the version listing under `prefix`, including
    /// delete markers.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::ListingFailed`] on failure.
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> Result<VersionPage, ConnectorError>;

    /// Fetches an object's body and headers.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::FetchFailed`] on failure.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject, ConnectorError>;

    /// Uploads an object.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::WriteError`] on failure.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ConnectorError>;
}

/// [`ObjectClient`] backed by the AWS SDK S3 client.
#[derive(Debug, Clone)]
pub struct S3ObjectClient {
    client: Client,
}

impl S3ObjectClient {
    /// Builds a client from static credentials and a region.
    pub async fn connect(config: &S3Config) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "s3-connect",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        Self {
            client: Client::new(&sdk_config),
        }
    }

    /// Wraps an already-built SDK client, e.g. one pointed at a custom
    /// endpoint.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or_default()
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn head_bucket(&self, bucket: &str) -> Result<(), ConnectorError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| ConnectorError::BucketUnavailable {
                bucket: bucket.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, ConnectorError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation.map(String::from))
            .send()
            .await
            .map_err(|e| ConnectorError::ListingFailed(e.to_string()))?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectEntry {
                    key: obj.key()?.to_string(),
                    last_modified: to_chrono(obj.last_modified()),
                })
            })
            .collect();

        Ok(ObjectPage {
            entries,
            next_continuation: output.next_continuation_token().map(String::from),
        })
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> Result<VersionPage, ConnectorError> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(prefix)
            .set_key_marker(key_marker.map(String::from))
            .send()
            .await
            .map_err(|e| ConnectorError::ListingFailed(e.to_string()))?;

        let versions = output
            .versions()
            .iter()
            .filter_map(|v| {
                Some(VersionEntry {
                    key: v.key()?.to_string(),
                    last_modified: to_chrono(v.last_modified()),
                    is_latest: v.is_latest().unwrap_or(false),
                })
            })
            .collect();

        let delete_markers = output
            .delete_markers()
            .iter()
            .filter_map(|m| {
                Some(VersionEntry {
                    key: m.key()?.to_string(),
                    last_modified: to_chrono(m.last_modified()),
                    is_latest: m.is_latest().unwrap_or(false),
                })
            })
            .collect();

        Ok(VersionPage {
            versions,
            delete_markers,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_key_marker: output.next_key_marker().map(String::from),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject, ConnectorError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ConnectorError::FetchFailed(format!("get {key}: {e}")))?;

        let content_type = output.content_type().map(String::from);
        let metadata = output.metadata().cloned().unwrap_or_default();
        let last_modified = to_chrono(output.last_modified());

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ConnectorError::FetchFailed(format!("read body of {key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(FetchedObject {
            body,
            content_type,
            metadata,
            last_modified,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ConnectorError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ConnectorError::WriteError(format!("put {key}: {e}")))?;
        Ok(())
    }
}
