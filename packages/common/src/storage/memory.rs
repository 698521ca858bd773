//! In-memory stores with fault injection and call recording.
//!
//! Used by tests and by local dry runs against fixture data.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::error::StorageError;
use super::traits::{
    BLOB_BATCH_LIMIT, BatchDeleteOutcome, BlobStore, DOCUMENT_BATCH_LIMIT, Document,
    DocumentStore, Page, Rejection, check_batch_size,
};

/// Record of a bulk delete call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCall {
    /// Table or bucket the call targeted.
    pub target: String,
    /// Key attribute used (document stores only).
    pub key_attribute: Option<String>,
    pub keys: Vec<String>,
}

/// Faults shared by both in-memory stores.
#[derive(Debug, Default)]
struct Faults {
    /// Table/bucket -> message returned by every page fetch.
    failing_reads: HashMap<String, String>,
    /// (table/bucket, 0-based delete call ordinal) that fail outright.
    failing_deletes: HashSet<(String, usize)>,
    /// Keys refused individually inside otherwise successful deletes.
    rejected_keys: HashSet<String>,
}

impl Faults {
    fn check_read(&self, target: &str) -> Result<(), StorageError> {
        match self.failing_reads.get(target) {
            Some(message) => Err(StorageError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct Calls {
    reads: Vec<String>,
    deletes: Vec<DeleteCall>,
}

impl Calls {
    fn delete_ordinal(&self, target: &str) -> usize {
        self.deletes.iter().filter(|c| c.target == target).count()
    }
}

fn parse_offset(cursor: Option<String>) -> Result<usize, StorageError> {
    match cursor {
        None => Ok(0),
        Some(c) => c.parse().map_err(|_| StorageError::InvalidCursor(c)),
    }
}

fn paginate<T: Clone>(items: &[T], offset: usize, page_size: usize) -> Page<T> {
    let start = offset.min(items.len());
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next: (end < items.len()).then(|| end.to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct DocumentState {
    tables: HashMap<String, Vec<Document>>,
    faults: Faults,
    calls: Calls,
}

/// Ordered in-memory document store.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<DocumentState>>,
    page_size: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryDocumentStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::default(),
            page_size: page_size.max(1),
        }
    }

    /// Append a document to `table`. Values that are not JSON objects are ignored.
    pub fn insert(&self, table: &str, document: serde_json::Value) {
        if let serde_json::Value::Object(doc) = document {
            lock(&self.state)
                .tables
                .entry(table.to_string())
                .or_default()
                .push(doc);
        }
    }

    /// Create `table` with no documents.
    pub fn create_table(&self, table: &str) {
        lock(&self.state).tables.entry(table.to_string()).or_default();
    }

    /// Current contents of `table`.
    pub fn documents(&self, table: &str) -> Vec<Document> {
        lock(&self.state)
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every page fetch of `table` fail with `message`.
    pub fn fail_scans(&self, table: &str, message: impl Into<String>) {
        lock(&self.state)
            .faults
            .failing_reads
            .insert(table.to_string(), message.into());
    }

    /// Make the `ordinal`-th (0-based) delete call against `table` fail.
    pub fn fail_delete_call(&self, table: &str, ordinal: usize) {
        lock(&self.state)
            .faults
            .failing_deletes
            .insert((table.to_string(), ordinal));
    }

    /// Refuse `key` individually whenever it appears in a delete call.
    pub fn reject_key(&self, key: impl Into<String>) {
        lock(&self.state).faults.rejected_keys.insert(key.into());
    }

    /// Tables whose pages were fetched, in call order.
    pub fn scan_calls(&self) -> Vec<String> {
        lock(&self.state).calls.reads.clone()
    }

    /// Every delete call issued, in call order.
    pub fn delete_calls(&self) -> Vec<DeleteCall> {
        lock(&self.state).calls.deletes.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, StorageError> {
        let mut state = lock(&self.state);
        state.calls.reads.push(table.to_string());
        state.faults.check_read(table)?;

        let offset = parse_offset(cursor)?;
        let documents = state
            .tables
            .get(table)
            .ok_or_else(|| StorageError::NotFound(format!("table {table}")))?;
        Ok(paginate(documents, offset, self.page_size))
    }

    async fn batch_delete(
        &self,
        table: &str,
        key_attribute: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        let mut state = lock(&self.state);
        let ordinal = state.calls.delete_ordinal(table);
        state.calls.deletes.push(DeleteCall {
            target: table.to_string(),
            key_attribute: Some(key_attribute.to_string()),
            keys: keys.to_vec(),
        });

        check_batch_size(keys.len(), DOCUMENT_BATCH_LIMIT)?;
        if state
            .faults
            .failing_deletes
            .contains(&(table.to_string(), ordinal))
        {
            return Err(StorageError::Backend(format!(
                "injected failure for delete call {ordinal} on {table}"
            )));
        }

        let mut outcome = BatchDeleteOutcome::default();
        let mut doomed = HashSet::new();
        for key in keys {
            if state.faults.rejected_keys.contains(key) {
                outcome.rejected.push(Rejection {
                    key: key.clone(),
                    reason: "rejected by store".into(),
                });
            } else {
                doomed.insert(key.as_str());
                outcome.accepted += 1;
            }
        }

        if let Some(documents) = state.tables.get_mut(table) {
            documents.retain(|doc| {
                !doc.get(key_attribute)
                    .and_then(|v| v.as_str())
                    .is_some_and(|v| doomed.contains(v))
            });
        }

        Ok(outcome)
    }
}

#[derive(Debug, Default)]
struct BlobState {
    buckets: HashMap<String, BTreeSet<String>>,
    faults: Faults,
    calls: Calls,
}

/// In-memory blob store. Keys are listed in lexicographic order.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    state: Arc<Mutex<BlobState>>,
    page_size: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryBlobStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::default(),
            page_size: page_size.max(1),
        }
    }

    pub fn insert(&self, bucket: &str, key: impl Into<String>) {
        lock(&self.state)
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.into());
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.state)
            .buckets
            .get(bucket)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every listing of `bucket` fail with `message`.
    pub fn fail_listing(&self, bucket: &str, message: impl Into<String>) {
        lock(&self.state)
            .faults
            .failing_reads
            .insert(bucket.to_string(), message.into());
    }

    /// Make the `ordinal`-th (0-based) delete call against `bucket` fail.
    pub fn fail_delete_call(&self, bucket: &str, ordinal: usize) {
        lock(&self.state)
            .faults
            .failing_deletes
            .insert((bucket.to_string(), ordinal));
    }

    /// Refuse `key` individually whenever it appears in a delete call.
    pub fn reject_key(&self, key: impl Into<String>) {
        lock(&self.state).faults.rejected_keys.insert(key.into());
    }

    /// Buckets whose pages were listed, in call order.
    pub fn list_calls(&self) -> Vec<String> {
        lock(&self.state).calls.reads.clone()
    }

    pub fn delete_calls(&self) -> Vec<DeleteCall> {
        lock(&self.state).calls.deletes.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_page(
        &self,
        bucket: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>, StorageError> {
        let mut state = lock(&self.state);
        state.calls.reads.push(bucket.to_string());
        state.faults.check_read(bucket)?;

        let offset = parse_offset(cursor)?;
        let keys: Vec<String> = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket {bucket}")))?
            .iter()
            .cloned()
            .collect();
        Ok(paginate(&keys, offset, self.page_size))
    }

    async fn delete_keys(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        let mut state = lock(&self.state);
        let ordinal = state.calls.delete_ordinal(bucket);
        state.calls.deletes.push(DeleteCall {
            target: bucket.to_string(),
            key_attribute: None,
            keys: keys.to_vec(),
        });

        check_batch_size(keys.len(), BLOB_BATCH_LIMIT)?;
        if state
            .faults
            .failing_deletes
            .contains(&(bucket.to_string(), ordinal))
        {
            return Err(StorageError::Backend(format!(
                "injected failure for delete call {ordinal} on {bucket}"
            )));
        }

        let BlobState {
            buckets, faults, ..
        } = &mut *state;
        let mut outcome = BatchDeleteOutcome::default();
        for key in keys {
            if faults.rejected_keys.contains(key) {
                outcome.rejected.push(Rejection {
                    key: key.clone(),
                    reason: "AccessDenied".into(),
                });
                continue;
            }
            if let Some(stored) = buckets.get_mut(bucket) {
                stored.remove(key);
            }
            outcome.accepted += 1;
        }
        Ok(outcome)
    }
}
