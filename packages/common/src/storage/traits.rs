use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// A stored document: a JSON object of attributes.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Hard per-call limit of a document-store bulk delete.
pub const DOCUMENT_BATCH_LIMIT: usize = 25;

/// Hard per-call limit of a blob-store bulk delete.
pub const BLOB_BATCH_LIMIT: usize = 1000;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` when the listing is exhausted.
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// An item refused individually within an otherwise successful bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub key: String,
    pub reason: String,
}

/// Result of a single bulk delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    /// Number of items the store accepted.
    pub accepted: usize,
    /// Items the store refused individually.
    pub rejected: Vec<Rejection>,
}

impl BatchDeleteOutcome {
    pub fn all_accepted(count: usize) -> Self {
        Self {
            accepted: count,
            rejected: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.rejected.extend(other.rejected);
    }
}

/// Paginated document store holding the record collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one page of `table`, starting at `cursor` (or the beginning).
    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, StorageError>;

    /// Delete every document of `table` whose `key_attribute` equals one of `keys`.
    ///
    /// Requests larger than [`DOCUMENT_BATCH_LIMIT`] fail with
    /// [`StorageError::BatchTooLarge`].
    async fn batch_delete(
        &self,
        table: &str,
        key_attribute: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError>;
}

/// Key-addressed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch one page of keys in `bucket`, starting at `cursor` (or the beginning).
    async fn list_page(
        &self,
        bucket: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>, StorageError>;

    /// Delete `keys` from `bucket`.
    ///
    /// Requests larger than [`BLOB_BATCH_LIMIT`] fail with
    /// [`StorageError::BatchTooLarge`].
    async fn delete_keys(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError>;
}

/// Reject bulk deletes above a store's hard limit.
pub fn check_batch_size(actual: usize, limit: usize) -> Result<(), StorageError> {
    if actual > limit {
        return Err(StorageError::BatchTooLarge { actual, limit });
    }
    Ok(())
}

/// Table and bucket names accepted by the backends.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
