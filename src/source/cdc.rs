//! CDC iterator: periodic change detection over the version listing.
//!
//! Every polling period the bucket's object versions and delete markers
//! are scanned, and changes newer than the watermark are turned into
//! Create/Update/Delete records. Bucket versioning must be enabled for
//! updates and deletes to be observable; without it the iterator silently
//! degrades to creates only.
//!
//! # Tasks
//!
//! Two cooperating tasks run behind the iterator:
//!
//! - *scanner*: wakes on a ticker, pages through `ListObjectVersions`,
//!   sorts the detected changes by `last_modified` and offers the batch to
//!   the formatter over a rendezvous channel. Only after the batch is
//!   accepted does the watermark advance to the batch's newest timestamp.
//! - *formatter*: fetches object bodies for creates and updates, builds
//!   records and publishes them on a single-slot buffer channel.
//!
//! Either task failing flips the shared dying signal so the other exits;
//! the first error becomes the iterator's terminal error. `has_next`
//! keeps returning `true` once the tasks are gone so the caller invokes
//! `next` one more time and collects that error.
//!
//! # Watermark edge
//!
//! The watermark comparison is strict, so a later change carrying the
//! same second-granularity `last_modified` as the newest event of the
//! previous batch is not re-detected. Write bursts within one second can
//! make this visible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::client::ObjectClient;
use crate::error::ConnectorError;
use crate::record::{Operation, Record, METADATA_CONTENT_TYPE};
use crate::source::position::{Mode, Position};

/// One detected change, held between the scan and the record build.
#[derive(Debug, Clone)]
struct CacheEntry {
    key: String,
    operation: Operation,
    last_modified: DateTime<Utc>,
}

/// Lifecycle state of the iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcState {
    /// Both tasks are running.
    Running,

    /// Stop was requested or a task failed; tasks are winding down.
    Dying,

    /// Both tasks have returned and the terminal error was collected.
    Dead,
}

/// Streams Create/Update/Delete records detected after a starting
/// watermark.
pub struct CdcIterator {
    records: mpsc::Receiver<Record>,
    dying_tx: Arc<watch::Sender<bool>>,
    scanner: Option<JoinHandle<Result<(), ConnectorError>>>,
    formatter: Option<JoinHandle<Result<(), ConnectorError>>>,
}

impl CdcIterator {
    /// Starts the scanner and formatter tasks. Changes with
    /// `last_modified` ≤ `from` are never emitted.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectClient>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        polling_period: Duration,
        from: DateTime<Utc>,
    ) -> Self {
        let bucket = bucket.into();
        let prefix = prefix.into();

        // Capacity 1 is the closest tokio gets to an unbuffered channel;
        // the scanner still cannot race ahead of the formatter by more
        // than one batch.
        let (cache_tx, cache_rx) = mpsc::channel::<Vec<CacheEntry>>(1);
        let (record_tx, record_rx) = mpsc::channel::<Record>(1);
        let (dying_tx, dying_rx) = watch::channel(false);
        let dying_tx = Arc::new(dying_tx);

        let scanner_task = Scanner {
            client: Arc::clone(&client),
            bucket: bucket.clone(),
            prefix,
            polling_period,
            from,
        };
        let formatter_task = Formatter { client, bucket };

        let scanner = tokio::spawn(supervised(
            scanner_task.run(cache_tx, dying_rx.clone()),
            Arc::clone(&dying_tx),
        ));
        let formatter = tokio::spawn(supervised(
            formatter_task.run(cache_rx, record_tx, dying_rx),
            Arc::clone(&dying_tx),
        ));

        Self {
            records: record_rx,
            dying_tx,
            scanner: Some(scanner),
            formatter: Some(formatter),
        }
    }

    /// Returns whether a call to `next` would make progress: a record is
    /// buffered, or the iterator is no longer alive and `next` will
    /// return the terminal error.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.records.is_empty() || !self.alive()
    }

    /// Returns the next record, blocking until one is available or the
    /// iterator dies. Cancel by dropping the future.
    ///
    /// # Errors
    ///
    /// Returns the terminal error once both tasks have returned:
    /// [`ConnectorError::Stopped`] after an explicit stop, or the first
    /// task error otherwise.
    pub async fn next(&mut self) -> Result<Record, ConnectorError> {
        match self.records.recv().await {
            Some(record) => Ok(record),
            None => Err(self.collect_terminal_error().await),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CdcState {
        if self.scanner.is_none() && self.formatter.is_none() {
            return CdcState::Dead;
        }
        if self.alive() {
            CdcState::Running
        } else {
            CdcState::Dying
        }
    }

    /// Asks both tasks to exit. Idempotent; already-buffered records can
    /// still be drained with `next`.
    pub fn stop(&mut self) {
        let _ = self.dying_tx.send(true);
    }

    fn alive(&self) -> bool {
        if *self.dying_tx.borrow() {
            return false;
        }
        match (&self.scanner, &self.formatter) {
            (Some(s), Some(f)) => !s.is_finished() && !f.is_finished(),
            _ => false,
        }
    }

    /// Joins both tasks and returns the first error either produced.
    async fn collect_terminal_error(&mut self) -> ConnectorError {
        let mut terminal = None;
        for handle in [self.scanner.take(), self.formatter.take()]
            .into_iter()
            .flatten()
        {
            match handle.await {
                Ok(Ok(())) | Ok(Err(ConnectorError::Stopped)) => {}
                Ok(Err(e)) => {
                    terminal.get_or_insert(e);
                }
                Err(join_err) => {
                    terminal.get_or_insert(ConnectorError::Internal(format!(
                        "iterator task panicked: {join_err}"
                    )));
                }
            }
        }
        terminal.unwrap_or(ConnectorError::Stopped)
    }
}

impl Drop for CdcIterator {
    fn drop(&mut self) {
        // Dropping the iterator without an explicit stop still winds the
        // tasks down.
        let _ = self.dying_tx.send(true);
    }
}

/// Flips the dying signal when the wrapped task fails, so its sibling
/// exits too.
async fn supervised(
    task: impl std::future::Future<Output = Result<(), ConnectorError>>,
    dying_tx: Arc<watch::Sender<bool>>,
) -> Result<(), ConnectorError> {
    let result = task.await;
    if result.is_err() {
        let _ = dying_tx.send(true);
    }
    result
}

struct Scanner {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,
    polling_period: Duration,
    from: DateTime<Utc>,
}

impl Scanner {
    async fn run(
        mut self,
        cache_tx: mpsc::Sender<Vec<CacheEntry>>,
        mut dying: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.polling_period,
            self.polling_period,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = dying.changed() => return Err(ConnectorError::Stopped),
                _ = ticker.tick() => {
                    let cache = self.scan().await?;
                    if cache.is_empty() {
                        continue;
                    }
                    debug!(
                        bucket = %self.bucket,
                        changes = cache.len(),
                        "detected bucket changes"
                    );

                    // The newest timestamp becomes the watermark, but only
                    // once the formatter has accepted the batch.
                    let newest = cache[cache.len() - 1].last_modified;
                    tokio::select! {
                        sent = cache_tx.send(cache) => {
                            if sent.is_err() {
                                // Formatter is gone; its error is terminal.
                                return Ok(());
                            }
                            self.from = newest;
                        }
                        _ = dying.changed() => return Err(ConnectorError::Stopped),
                    }
                }
            }
        }
    }

    /// One full pass over the version listing, returning detected changes
    /// sorted ascending by `last_modified`.
    async fn scan(&self) -> Result<Vec<CacheEntry>, ConnectorError> {
        let mut cache: Vec<CacheEntry> = Vec::new();
        let mut updated_keys: HashSet<String> = HashSet::new();
        let mut key_marker: Option<String> = None;

        loop {
            let page = self
                .client
                .list_object_versions(&self.bucket, &self.prefix, key_marker.as_deref())
                .await?;

            for version in page.versions {
                if version.is_latest {
                    if version.last_modified > self.from {
                        cache.push(CacheEntry {
                            key: version.key,
                            operation: Operation::Create,
                            last_modified: version.last_modified,
                        });
                    }
                } else {
                    // A non-latest version means the key was overwritten
                    // at some point.
                    updated_keys.insert(version.key);
                }
            }

            for marker in page.delete_markers {
                if marker.is_latest && marker.last_modified > self.from {
                    cache.push(CacheEntry {
                        key: marker.key,
                        operation: Operation::Delete,
                        last_modified: marker.last_modified,
                    });
                }
            }

            if !page.is_truncated {
                break;
            }
            key_marker = page.next_key_marker;
        }

        // A latest version with at least one prior version is an
        // overwrite, not a create.
        for entry in &mut cache {
            if entry.operation == Operation::Create && updated_keys.contains(&entry.key) {
                entry.operation = Operation::Update;
            }
        }

        cache.sort_by_key(|entry| entry.last_modified);
        Ok(cache)
    }
}

struct Formatter {
    client: Arc<dyn ObjectClient>,
    bucket: String,
}

impl Formatter {
    async fn run(
        self,
        mut cache_rx: mpsc::Receiver<Vec<CacheEntry>>,
        record_tx: mpsc::Sender<Record>,
        mut dying: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        loop {
            tokio::select! {
                _ = dying.changed() => return Err(ConnectorError::Stopped),
                cache = cache_rx.recv() => {
                    let Some(entries) = cache else {
                        // Scanner is gone; its error is terminal.
                        return Ok(());
                    };
                    for entry in entries {
                        let record = self.build_record(&entry).await?;
                        tokio::select! {
                            sent = record_tx.send(record) => {
                                if sent.is_err() {
                                    return Ok(());
                                }
                            }
                            _ = dying.changed() => return Err(ConnectorError::Stopped),
                        }
                    }
                }
            }
        }
    }

    async fn build_record(&self, entry: &CacheEntry) -> Result<Record, ConnectorError> {
        let position =
            Position::new(entry.key.clone(), Mode::Cdc, entry.last_modified).serialize();
        let key = entry.key.clone().into_bytes();

        match entry.operation {
            Operation::Delete => Ok(Record::delete(position, HashMap::new(), key)),
            Operation::Create | Operation::Update => {
                let object = self.client.get_object(&self.bucket, &entry.key).await?;

                let mut metadata = object.metadata;
                if let Some(content_type) = object.content_type {
                    metadata.insert(METADATA_CONTENT_TYPE.to_string(), content_type);
                }

                Ok(if entry.operation == Operation::Create {
                    Record::create(position, metadata, key, object.body)
                } else {
                    Record::update(position, metadata, key, None, object.body)
                })
            }
            Operation::Snapshot => Err(ConnectorError::Internal(format!(
                "snapshot entry {} in change cache",
                entry.key
            ))),
        }
    }
}
