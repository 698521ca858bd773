use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ::s3::creds::Credentials;
use ::s3::{Bucket, Region};
use tracing::debug;

use super::error::StorageError;
use super::traits::{
    BLOB_BATCH_LIMIT, BatchDeleteOutcome, BlobStore, Page, Rejection, check_batch_size,
};
use crate::config::S3Config;

/// S3-compatible blob store backed by `rust-s3`.
///
/// Bulk deletes are issued as concurrent per-object DELETE requests; an
/// object whose request fails is reported as a rejection of the batch.
pub struct S3BlobStore {
    region: Region,
    credentials: Credentials,
    path_style: bool,
    delete_concurrency: usize,
    list_page_size: usize,
}

impl S3BlobStore {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("failed to load S3 credentials: {e}")))?;

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
            delete_concurrency: config.delete_concurrency.max(1),
            list_page_size: config.list_page_size.clamp(1, 1000),
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list_page(
        &self,
        bucket: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>, StorageError> {
        let handle = self.bucket(bucket)?;
        let (result, status) = handle
            .list_page(
                String::new(),
                None,
                cursor,
                None,
                Some(self.list_page_size),
            )
            .await?;

        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!(
                "ListObjectsV2 on {bucket} returned status {status}"
            )));
        }

        let items: Vec<String> = result.contents.into_iter().map(|o| o.key).collect();
        let next = if result.is_truncated {
            match result.next_continuation_token {
                Some(token) => Some(token),
                None => {
                    return Err(StorageError::InvalidCursor(
                        "truncated listing without continuation token".into(),
                    ));
                }
            }
        } else {
            None
        };

        debug!(bucket, keys = items.len(), more = next.is_some(), "Listed S3 page");
        Ok(Page { items, next })
    }

    async fn delete_keys(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        check_batch_size(keys.len(), BLOB_BATCH_LIMIT)?;
        let handle = self.bucket(bucket)?;
        let handle = &*handle;

        let results: Vec<(String, Result<u16, StorageError>)> = stream::iter(keys.to_vec())
            .map(|key: String| async move {
                let result = handle
                    .delete_object(&key)
                    .await
                    .map(|response| response.status_code())
                    .map_err(StorageError::from);
                (key, result)
            })
            .buffer_unordered(self.delete_concurrency)
            .collect()
            .await;

        let outcome = collect_deletes(results);
        debug!(
            bucket,
            accepted = outcome.accepted,
            rejected = outcome.rejected.len(),
            "Deleted S3 objects"
        );
        Ok(outcome)
    }
}

/// A missing object counts as deleted. Rejections are sorted by key.
fn collect_deletes(results: Vec<(String, Result<u16, StorageError>)>) -> BatchDeleteOutcome {
    let mut outcome = BatchDeleteOutcome::default();
    for (key, result) in results {
        match result {
            Ok(status) if (200..300).contains(&status) || status == 404 => outcome.accepted += 1,
            Ok(status) => outcome.rejected.push(Rejection {
                key,
                reason: format!("DeleteObject returned status {status}"),
            }),
            Err(e) => outcome.rejected.push(Rejection {
                key,
                reason: e.to_string(),
            }),
        }
    }
    outcome.rejected.sort_by(|a, b| a.key.cmp(&b.key));
    outcome
}
