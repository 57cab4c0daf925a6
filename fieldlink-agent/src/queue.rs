//! Durable queue of undelivered batches.
//!
//! Backed by a single redb file with one table, `queue: &str -> &[u8]`.
//! Values are compact JSON `{payload, status_code, metric_type}`. redb allows
//! one write transaction at a time alongside any number of readers, and every
//! commit is durable before `put`/`delete` return.
//!
//! A [`QueueStore`] is a cheap handle over the open database. The collection
//! loop and the retry worker each hold their own clone; opening the same file
//! a second time in one process is refused by redb, so sharing the handle is
//! how both paths reach the queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fieldlink_agent_framework::{Batch, MetricKind};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Undelivered batches keyed by `<kind>-<unix_seconds>`.
const QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("queue");

/// Errors from the durable queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to open queue database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("Queue transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Queue table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Queue storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Queue commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Queue entry '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: fieldlink_common::Error,
    },

    #[error("Queue entry could not be encoded: {0}")]
    Encode(#[source] fieldlink_common::Error),

    #[error("Refusing to queue {kind} batch with a NaN or infinite value")]
    NonFinite { kind: MetricKind },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue task failed: {0}")]
    Task(String),
}

/// Persisted form of an undelivered batch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub payload: Batch,
    pub status_code: Option<u16>,
    pub kind: MetricKind,
}

impl QueueEntry {
    /// Build an entry for a batch that failed with `status_code`.
    pub fn new(payload: Batch, status_code: Option<u16>) -> Self {
        let kind = payload.kind();
        Self {
            payload,
            status_code,
            kind,
        }
    }

    /// Queue key for a batch of `kind` persisted at `timestamp`.
    ///
    /// Second granularity: a second failure of the same kind within the same
    /// second replaces the first entry.
    pub fn key_for(kind: MetricKind, timestamp: i64) -> String {
        format!("{}-{}", kind.as_str(), timestamp)
    }

    /// Queue key for this entry persisted at `timestamp`.
    pub fn key_at(&self, timestamp: i64) -> String {
        Self::key_for(self.kind, timestamp)
    }

    fn encode(&self) -> Result<Vec<u8>, QueueError> {
        if !self.payload.is_finite() {
            return Err(QueueError::NonFinite { kind: self.kind });
        }
        let stored = StoredEntryRef {
            payload: &self.payload,
            status_code: self.status_code,
            metric_type: self.kind,
        };
        fieldlink_common::encode(&stored).map_err(QueueError::Encode)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<Self, QueueError> {
        let stored: StoredEntry =
            fieldlink_common::decode(bytes).map_err(|source| QueueError::Decode {
                key: key.to_string(),
                source,
            })?;
        Ok(Self {
            payload: stored.payload,
            status_code: stored.status_code,
            kind: stored
                .metric_type
                .unwrap_or_else(|| MetricKind::from_key(key)),
        })
    }
}

#[derive(Serialize)]
struct StoredEntryRef<'a> {
    payload: &'a Batch,
    status_code: Option<u16>,
    metric_type: MetricKind,
}

#[derive(Deserialize)]
struct StoredEntry {
    // Older records stored sensor payloads under "metrics".
    #[serde(alias = "metrics")]
    payload: Batch,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    metric_type: Option<MetricKind>,
}

/// Handle to the durable queue.
#[derive(Clone)]
pub struct QueueStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("path", &self.path)
            .finish()
    }
}

impl QueueStore {
    /// Open or create the queue file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path)?;

        // Create the table up front so read transactions never miss it.
        let txn = db.begin_write()?;
        txn.open_table(QUEUE)?;
        txn.commit()?;

        debug!(path = %path.display(), "Opened queue database");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the entry under `key`.
    pub fn put(&self, key: &str, entry: &QueueEntry) -> Result<(), QueueError> {
        let bytes = entry.encode()?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(QUEUE)?;
            table.insert(key, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Load the entry under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<QueueEntry>, QueueError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(QUEUE)?;
        match table.get(key)? {
            Some(guard) => QueueEntry::decode(key, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Remove the entry under `key`. Returns false when it was already gone.
    pub fn delete(&self, key: &str) -> Result<bool, QueueError> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(QUEUE)?;
            let removed = table.remove(key)?.is_some();
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All keys currently queued, in key order.
    pub fn list_keys(&self) -> Result<Vec<String>, QueueError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(QUEUE)?;
        let mut keys = Vec::new();
        for item in table.iter()? {
            let (key, _) = item?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    /// Number of queued entries.
    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.list_keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    /// Run a store operation on the blocking pool.
    ///
    /// Keeps disk I/O and fsync off the async workers.
    pub async fn blocking<T, F>(&self, op: F) -> Result<T, QueueError>
    where
        F: FnOnce(&QueueStore) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| QueueError::Task(e.to_string()))?
    }

    #[cfg(test)]
    fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), QueueError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(QUEUE)?;
            table.insert(key, bytes)?;
        }
        txn.commit()?;
        Ok(())
    }
}
