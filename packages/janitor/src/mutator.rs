//! Bounded batch deletion.
//!
//! Doomed items are cut into chunks no larger than the store's cap and
//! deleted one chunk at a time. A failed chunk is recorded and skipped;
//! it never stops the remaining chunks.

use std::collections::HashSet;
use std::future::Future;

use common::storage::{BatchDeleteOutcome, BlobStore, DocumentStore, Rejection, StorageError};
use common::{PeerResponse, PeerResponseKey};
use tracing::{debug, warn};

use crate::report::{KindSummary, OrphanKind};

/// Rejections quoted in a partial-batch error message.
const QUOTED_REJECTIONS: usize = 3;

/// An item that can be named in the report once deleted.
pub trait Doomed: Sized {
    /// The key each item of `chunk` is deleted under, in chunk order.
    fn labels(chunk: &[Self]) -> Vec<Option<&str>>;
}

impl Doomed for String {
    fn labels(chunk: &[Self]) -> Vec<Option<&str>> {
        chunk.iter().map(|key| Some(key.as_str())).collect()
    }
}

impl Doomed for PeerResponse {
    fn labels(chunk: &[Self]) -> Vec<Option<&str>> {
        let Some(first) = chunk.first() else {
            return Vec::new();
        };
        let key = PeerResponseKey::select(first);
        chunk
            .iter()
            .map(|record| sent_identity(record, key).map(|(_, id)| id))
            .collect()
    }
}

/// The attribute and value a record is addressed by in a chunk keyed on `key`.
fn sent_identity(record: &PeerResponse, key: PeerResponseKey) -> Option<(PeerResponseKey, &str)> {
    record
        .identity(key)
        .map(|id| (key, id))
        .or_else(|| record.identity(key.other()).map(|id| (key.other(), id)))
}

/// Outcome of deleting one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindTally {
    pub deleted: usize,
    pub deleted_sample: Vec<String>,
    pub errors: Vec<String>,
    /// Chunks attempted, failed or not.
    pub batches: usize,
}

impl KindTally {
    pub fn summary(&self) -> KindSummary {
        KindSummary {
            count: self.deleted,
            sample: self.deleted_sample.clone(),
        }
    }
}

/// Batch size and report sampling for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub cap: usize,
    pub sample_size: usize,
}

fn rejection_message(rejected: &[Rejection]) -> String {
    let mut quoted: Vec<String> = rejected
        .iter()
        .take(QUOTED_REJECTIONS)
        .map(|r| format!("{}: {}", r.key, r.reason))
        .collect();
    if rejected.len() > QUOTED_REJECTIONS {
        quoted.push("...".into());
    }
    quoted.join("; ")
}

/// Delete `items` in chunks of at most `plan.cap`, one `delete` call per chunk.
pub async fn delete_in_batches<'a, T, F, Fut>(
    kind: OrphanKind,
    items: &'a [T],
    plan: BatchPlan,
    mut delete: F,
) -> KindTally
where
    T: Doomed,
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<BatchDeleteOutcome, StorageError>>,
{
    let mut tally = KindTally::default();
    let cap = plan.cap.max(1);
    let total = items.len().div_ceil(cap);

    for (index, chunk) in items.chunks(cap).enumerate() {
        let batch = index + 1;
        tally.batches += 1;

        match delete(chunk).await {
            Ok(outcome) => {
                debug!(
                    kind = %kind,
                    batch,
                    total,
                    size = chunk.len(),
                    accepted = outcome.accepted,
                    rejected = outcome.rejected.len(),
                    "Deleted batch"
                );

                let rejected: HashSet<&str> =
                    outcome.rejected.iter().map(|r| r.key.as_str()).collect();
                let room = plan.sample_size.saturating_sub(tally.deleted_sample.len());
                tally.deleted_sample.extend(
                    T::labels(chunk)
                        .into_iter()
                        .flatten()
                        .filter(|label| !rejected.contains(label))
                        .take(room.min(outcome.accepted))
                        .map(str::to_string),
                );
                tally.deleted += outcome.accepted;

                if !outcome.rejected.is_empty() {
                    warn!(
                        kind = %kind,
                        batch,
                        rejected = outcome.rejected.len(),
                        "Batch partially rejected"
                    );
                    tally.errors.push(format!(
                        "{kind}: batch {batch}/{total}: {} of {} item(s) rejected ({})",
                        outcome.rejected.len(),
                        chunk.len(),
                        rejection_message(&outcome.rejected)
                    ));
                }
            }
            Err(error) => {
                warn!(
                    kind = %kind,
                    batch,
                    total,
                    size = chunk.len(),
                    error = %error,
                    "Batch delete failed"
                );
                tally.errors.push(format!(
                    "{kind}: batch {batch}/{total} of {} item(s) failed: {error}",
                    chunk.len()
                ));
            }
        }
    }

    tally
}

/// Delete documents of `table` addressed by a fixed identity attribute.
pub async fn delete_documents(
    store: &dyn DocumentStore,
    kind: OrphanKind,
    table: &str,
    key_attribute: &str,
    ids: &[String],
    plan: BatchPlan,
) -> KindTally {
    delete_in_batches(kind, ids, plan, |chunk| {
        store.batch_delete(table, key_attribute, chunk)
    })
    .await
}

/// Delete one chunk of peer responses.
///
/// The identity attribute comes from the chunk's first record. Records
/// that only carry the other attribute go out in a second request.
async fn delete_peer_chunk(
    store: &dyn DocumentStore,
    table: &str,
    chunk: &[PeerResponse],
) -> Result<BatchDeleteOutcome, StorageError> {
    let mut outcome = BatchDeleteOutcome::default();
    let Some(first) = chunk.first() else {
        return Ok(outcome);
    };
    let key = PeerResponseKey::select(first);

    let mut primary = Vec::new();
    let mut secondary = Vec::new();
    for record in chunk {
        match sent_identity(record, key) {
            Some((sent, id)) if sent == key => primary.push(id.to_string()),
            Some((_, id)) => secondary.push(id.to_string()),
            None => outcome.rejected.push(Rejection {
                key: format!(
                    "<unidentified, videoId={}>",
                    record.video_id.as_deref().unwrap_or("")
                ),
                reason: "record has neither id nor responseId".into(),
            }),
        }
    }

    debug!(
        key = %key,
        primary = primary.len(),
        secondary = secondary.len(),
        "Selected peer response key for batch"
    );

    if !primary.is_empty() {
        outcome.merge(store.batch_delete(table, key.attribute(), &primary).await?);
    }
    if !secondary.is_empty() {
        // The first request already went through; only these records are lost.
        let result = store
            .batch_delete(table, key.other().attribute(), &secondary)
            .await;
        match result {
            Ok(second) => outcome.merge(second),
            Err(error) => outcome.rejected.extend(secondary.into_iter().map(|id| Rejection {
                key: id,
                reason: error.to_string(),
            })),
        }
    }
    Ok(outcome)
}

pub async fn delete_peer_responses(
    store: &dyn DocumentStore,
    table: &str,
    records: &[PeerResponse],
    plan: BatchPlan,
) -> KindTally {
    delete_in_batches(OrphanKind::PeerResponses, records, plan, |chunk| {
        delete_peer_chunk(store, table, chunk)
    })
    .await
}

pub async fn delete_blobs(
    store: &dyn BlobStore,
    bucket: &str,
    keys: &[String],
    plan: BatchPlan,
) -> KindTally {
    delete_in_batches(OrphanKind::BlobObjects, keys, plan, |chunk| {
        store.delete_keys(bucket, chunk)
    })
    .await
}
