//! Paginated collection reader.
//!
//! Hides store pagination behind lazy streams. Each call starts from the
//! first page; a stream cannot be resumed once dropped. A page that still
//! fails after the retry budget ends the stream with a [`ScanError`], and
//! callers must not use a partial result.

use std::future::Future;

use common::Record;
use common::storage::{BlobStore, Document, DocumentStore, Page, StorageError};
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::retry::RetryPolicy;

async fn fetch_with_retry<T, F, Fut>(
    source_name: &str,
    policy: RetryPolicy,
    mut fetch: F,
) -> Result<Page<T>, ScanError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Page<T>, StorageError>>,
{
    let mut attempt: u8 = 0;
    loop {
        match fetch().await {
            Ok(page) => return Ok(page),
            Err(error) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(
                    source = source_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Page fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(ScanError::Page {
                    source_name: source_name.to_string(),
                    attempts: u32::from(attempt) + 1,
                    error,
                });
            }
        }
    }
}

fn decode<T: Record>(table: &str, doc: Document) -> Result<T, ScanError> {
    serde_json::from_value(serde_json::Value::Object(doc)).map_err(|error| ScanError::Decode {
        source_name: table.to_string(),
        error,
    })
}

/// Lazily read every document of `table` as `T`.
pub fn scan_documents<'a, T: Record>(
    store: &'a dyn DocumentStore,
    table: &'a str,
    policy: RetryPolicy,
) -> impl Stream<Item = Result<T, ScanError>> + Send + 'a {
    // State: `None` once the store reported the last page.
    stream::try_unfold(Some(None::<String>), move |cursor| async move {
        let Some(cursor) = cursor else {
            return Ok(None);
        };
        let page = fetch_with_retry(table, policy, || store.scan_page(table, cursor.clone())).await?;
        debug!(
            table,
            documents = page.items.len(),
            more = page.next.is_some(),
            "Fetched document page"
        );
        Ok::<_, ScanError>(Some((page.items, page.next.map(Some))))
    })
    .map_ok(move |docs| stream::iter(docs.into_iter().map(move |doc| decode::<T>(table, doc))))
    .try_flatten()
}

/// Lazily list every key of `bucket`.
pub fn list_blob_keys<'a>(
    store: &'a dyn BlobStore,
    bucket: &'a str,
    policy: RetryPolicy,
) -> impl Stream<Item = Result<String, ScanError>> + Send + 'a {
    stream::try_unfold(Some(None::<String>), move |cursor| async move {
        let Some(cursor) = cursor else {
            return Ok(None);
        };
        let page = fetch_with_retry(bucket, policy, || store.list_page(bucket, cursor.clone())).await?;
        debug!(
            bucket,
            keys = page.items.len(),
            more = page.next.is_some(),
            "Fetched key page"
        );
        Ok::<_, ScanError>(Some((page.items, page.next.map(Some))))
    })
    .map_ok(|keys| stream::iter(keys.into_iter().map(Ok)))
    .try_flatten()
}

/// Read a whole collection. Either every record or an error.
pub async fn read_collection<T: Record>(
    store: &dyn DocumentStore,
    table: &str,
    policy: RetryPolicy,
) -> Result<Vec<T>, ScanError> {
    let records: Vec<T> = scan_documents(store, table, policy).try_collect().await?;
    info!(
        collection = %T::COLLECTION,
        table,
        records = records.len(),
        "Scanned collection"
    );
    Ok(records)
}

/// List a whole bucket. Either every key or an error.
pub async fn read_blob_keys(
    store: &dyn BlobStore,
    bucket: &str,
    policy: RetryPolicy,
) -> Result<Vec<String>, ScanError> {
    let keys: Vec<String> = list_blob_keys(store, bucket, policy)
        .try_collect()
        .await?;
    info!(bucket, keys = keys.len(), "Listed bucket");
    Ok(keys)
}
