//! Batching writers: one uploaded object per batch.
//!
//! [`S3Writer`] persists each batch as `<prefix><uuid>.<ext>` in the
//! configured bucket. [`LocalWriter`] is the filesystem twin used by
//! tests; it numbers objects `local-NNNN.<ext>` so output order is easy
//! to assert on.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::client::ObjectClient;
use crate::destination::format::Format;
use crate::error::ConnectorError;
use crate::record::Record;

/// An ordered group of records persisted as one object.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Records in the order the host passed them in.
    pub records: Vec<Record>,

    /// Format the object is encoded in.
    pub format: Format,
}

/// Persists batches as single objects.
#[async_trait]
pub trait Writer: Send {
    /// Encodes and persists one batch, returning the object size in
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if encoding or the upload fails.
    async fn write(&mut self, batch: &Batch) -> Result<u64, ConnectorError>;

    /// Names of the objects written so far, oldest first.
    fn written_objects(&self) -> &[String];

    /// Name of the most recently written object.
    fn last_written(&self) -> Option<&str> {
        self.written_objects().last().map(String::as_str)
    }
}

/// Writer that uploads batches to the bucket.
pub struct S3Writer {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,
    written: Vec<String>,
}

impl S3Writer {
    /// Creates a writer targeting `bucket`, naming objects under
    /// `prefix`.
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectClient>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            written: Vec::new(),
        }
    }
}

#[async_trait]
impl Writer for S3Writer {
    async fn write(&mut self, batch: &Batch) -> Result<u64, ConnectorError> {
        let key = format!(
            "{}{}.{}",
            self.prefix,
            Uuid::new_v4(),
            batch.format.extension()
        );
        let data = batch.format.encode(&batch.records)?;
        let bytes = data.len() as u64;

        self.client
            .put_object(&self.bucket, &key, data, batch.format.content_type())
            .await?;

        info!(
            bucket = %self.bucket,
            key = %key,
            records = batch.records.len(),
            bytes,
            "uploaded batch object"
        );
        self.written.push(key);
        Ok(bytes)
    }

    fn written_objects(&self) -> &[String] {
        &self.written
    }
}

/// Writer that drops batch objects into a local directory. Used by tests
/// in place of a bucket.
pub struct LocalWriter {
    dir: PathBuf,
    count: usize,
    written: Vec<String>,
}

impl LocalWriter {
    /// Creates a writer placing objects into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            count: 0,
            written: Vec::new(),
        }
    }
}

#[async_trait]
impl Writer for LocalWriter {
    async fn write(&mut self, batch: &Batch) -> Result<u64, ConnectorError> {
        let name = format!("local-{:04}.{}", self.count, batch.format.extension());
        let data = batch.format.encode(&batch.records)?;
        let bytes = data.len() as u64;

        tokio::fs::write(self.dir.join(&name), data).await?;

        self.count += 1;
        self.written.push(name);
        Ok(bytes)
    }

    fn written_objects(&self) -> &[String] {
        &self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryObjectClient;
    use std::collections::HashMap;

    fn batch(n: usize, format: Format) -> Batch {
        let records = (0..n)
            .map(|i| {
                Record::create(
                    format!("k{i}_c{i}").into_bytes(),
                    HashMap::new(),
                    format!("k{i}").into_bytes(),
                    format!("b{i}").into_bytes(),
                )
            })
            .collect();
        Batch { records, format }
    }

    #[tokio::test]
    async fn test_s3_writer_one_object_per_batch() {
        let client = Arc::new(InMemoryObjectClient::new("b"));
        let mut writer = S3Writer::new(Arc::clone(&client) as Arc<dyn crate::client::ObjectClient>, "b", "out/");

        writer.write(&batch(3, Format::Json)).await.unwrap();
        writer.write(&batch(2, Format::Json)).await.unwrap();

        assert_eq!(writer.written_objects().len(), 2);
        assert_eq!(client.uploaded().len(), 2);
        for name in writer.written_objects() {
            assert!(name.starts_with("out/"));
            assert!(name.ends_with(".json"));
        }
    }

    #[tokio::test]
    async fn test_s3_writer_object_names_are_unique() {
        let client = Arc::new(InMemoryObjectClient::new("b"));
        let mut writer = S3Writer::new(client, "b", "");

        writer.write(&batch(1, Format::Json)).await.unwrap();
        writer.write(&batch(1, Format::Json)).await.unwrap();

        let names = writer.written_objects();
        assert_ne!(names[0], names[1]);
        assert_eq!(writer.last_written(), Some(names[1].as_str()));
    }

    #[tokio::test]
    async fn test_s3_writer_sets_content_type() {
        let client = Arc::new(InMemoryObjectClient::new("b"));
        let mut writer = S3Writer::new(Arc::clone(&client) as Arc<dyn crate::client::ObjectClient>, "b", "");

        writer.write(&batch(1, Format::Parquet)).await.unwrap();

        let uploads = client.uploaded();
        assert_eq!(uploads[0].content_type, "application/octet-stream");
        assert!(uploads[0].key.ends_with(".parquet"));
    }

    #[tokio::test]
    async fn test_local_writer_numbers_objects() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LocalWriter::new(dir.path());

        writer.write(&batch(2, Format::Json)).await.unwrap();
        writer.write(&batch(2, Format::Parquet)).await.unwrap();
        writer.write(&batch(1, Format::Json)).await.unwrap();

        assert_eq!(
            writer.written_objects(),
            ["local-0000.json", "local-0001.parquet", "local-0002.json"]
        );
        for name in writer.written_objects() {
            assert!(dir.path().join(name).exists());
        }
    }
}
