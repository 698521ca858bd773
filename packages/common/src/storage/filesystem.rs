use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::error::StorageError;
use super::traits::{
    BLOB_BATCH_LIMIT, BatchDeleteOutcome, BlobStore, Page, Rejection, check_batch_size,
    validate_name,
};

/// Filesystem-backed blob store.
///
/// Each bucket is a directory under `base_path`; object keys are the
/// `/`-separated paths of the files below it:
/// `{base_path}/{bucket}/{key}`
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    page_size: usize,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, page_size: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            page_size: page_size.max(1),
        })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_name(bucket)?;
        Ok(self.base_path.join(bucket))
    }

    /// Compute the filesystem path for a key, refusing keys that escape the bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let normal = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !normal {
            return Err(StorageError::InvalidName(key.to_string()));
        }
        Ok(self.bucket_path(bucket)?.join(relative))
    }

    /// Write an object. Used to seed local buckets.
    pub async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        Ok(())
    }

    /// All keys of a bucket in lexicographic order.
    async fn all_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let root = self.bucket_path(bucket)?;
        if !fs::try_exists(&root).await? {
            return Err(StorageError::NotFound(format!("bucket {bucket}")));
        }

        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let Ok(relative) = path.strip_prefix(&root) else {
                        continue;
                    };
                    match key_of(relative) {
                        Some(key) => keys.push(key),
                        // Not addressable by a string key, so it could never be deleted.
                        None => warn!(path = %path.display(), "Skipping object with a non-UTF-8 name"),
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// The `/`-joined key of a path relative to its bucket, if every component is UTF-8.
fn key_of(relative: &Path) -> Option<String> {
    relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn list_page(
        &self,
        bucket: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>, StorageError> {
        let keys = self.all_keys(bucket).await?;

        let start = match cursor {
            Some(after) => keys.partition_point(|k| k.as_str() <= after.as_str()),
            None => 0,
        };
        let end = (start + self.page_size).min(keys.len());
        let items = keys[start..end].to_vec();
        let next = if end < keys.len() {
            items.last().cloned()
        } else {
            None
        };

        Ok(Page { items, next })
    }

    async fn delete_keys(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        check_batch_size(keys.len(), BLOB_BATCH_LIMIT)?;
        self.bucket_path(bucket)?;

        let mut outcome = BatchDeleteOutcome::default();
        for key in keys {
            let path = match self.object_path(bucket, key) {
                Ok(path) => path,
                Err(e) => {
                    outcome.rejected.push(Rejection {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => outcome.accepted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => outcome.accepted += 1,
                Err(e) => outcome.rejected.push(Rejection {
                    key: key.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}
