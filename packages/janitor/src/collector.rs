//! Run coordinator.
//!
//! One pass is scan, analyze, then either stop (dry run) or delete. Scan
//! failures abort before anything is deleted; delete failures are recorded
//! in the report and the pass carries on.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::storage::{BlobStore, DocumentStore};
use common::{Assignment, Course, PeerResponse, Submission};
use tracing::{error, info, warn};

use crate::config::GcConfig;
use crate::detector::{OrphanSets, ProtectedPrefixes, Snapshot, detect_orphans};
use crate::error::{JanitorError, RunAborted, ScanError};
use crate::mutator::{
    BatchPlan, KindTally, delete_blobs, delete_documents, delete_peer_responses,
};
use crate::reader::{read_blob_keys, read_collection};
use crate::report::{KindCounts, KindSummary, OrphanKind, RunMode, RunReport, ScannedCounts};
use crate::resolver::KeyResolver;
use crate::retry::RetryPolicy;

/// Per-run switches chosen by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Analyse only; never call a delete endpoint.
    pub dry_run: bool,
    /// List the bucket and reclaim unreferenced blobs.
    pub include_blobs: bool,
}

impl RunOptions {
    fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Apply
        }
    }
}

/// Cross-store orphan collector.
///
/// # Example
///
/// ```rust,ignore
/// let collector = GarbageCollector::new(config, documents, Some(blobs));
///
/// // Look first
/// let report = collector.run(RunOptions { dry_run: true, include_blobs: true }).await?;
///
/// // Then reclaim
/// let report = collector.run(RunOptions { dry_run: false, include_blobs: true }).await?;
/// ```
pub struct GarbageCollector {
    config: GcConfig,
    documents: Arc<dyn DocumentStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    resolver: KeyResolver,
    protected: ProtectedPrefixes,
}

fn settle<T: Default>(result: Result<T, ScanError>, failures: &mut Vec<ScanError>) -> T {
    result.unwrap_or_else(|error| {
        failures.push(error);
        T::default()
    })
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl GarbageCollector {
    pub fn new(
        config: GcConfig,
        documents: Arc<dyn DocumentStore>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        let resolver = KeyResolver::new(&config.bucket);
        let protected = ProtectedPrefixes::new(config.protected_prefixes.iter().cloned());
        Self {
            config,
            documents,
            blobs,
            resolver,
            protected,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] with the partial report if blob cleanup is
    /// requested without a blob store, or if any scan fails. Failed or
    /// partially rejected delete batches do not error; they are listed in
    /// the report's `errors`.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport, RunAborted> {
        let start = Instant::now();
        let mut report = RunReport::new(options.mode());

        let blob_store = match (options.include_blobs, &self.blobs) {
            (false, _) => None,
            (true, Some(store)) => Some(store.as_ref()),
            (true, None) => {
                return Err(RunAborted {
                    report,
                    error: JanitorError::MissingBlobStore,
                });
            }
        };

        info!(
            mode = options.mode().as_str(),
            bucket = %self.config.bucket,
            include_blobs = options.include_blobs,
            protected_prefixes = ?self.protected.as_slice(),
            "Starting orphan reconciliation"
        );

        let snapshot = match self.scan(blob_store, &mut report.scanned).await {
            Ok(snapshot) => snapshot,
            Err((first, others)) => {
                report.errors.push(first.to_string());
                report.errors.extend(others);
                report.duration_ms = elapsed_ms(start);
                error!(
                    error = %first,
                    failed_reads = report.errors.len(),
                    "Scan failed, no deletions attempted"
                );
                return Err(RunAborted {
                    report,
                    error: first.into(),
                });
            }
        };

        let orphans = detect_orphans(&snapshot, &self.resolver, &self.protected);
        for unresolved in &orphans.unresolved_urls {
            warn!(
                submission_id = %unresolved.submission_id,
                url = %unresolved.url,
                "Media URL does not resolve to a storage key"
            );
        }
        let orphaned = self.orphan_counts(&orphans);
        info!(
            assignments = orphaned.assignments.count,
            submissions = orphaned.submissions.count,
            peer_responses = orphaned.peer_responses.count,
            blob_objects = orphaned.blob_objects.as_ref().map(|s| s.count),
            unresolved_urls = orphans.unresolved_urls.len(),
            "Orphan analysis complete"
        );
        report.unresolved_urls = KindSummary::from_ids(
            orphans
                .unresolved_urls
                .iter()
                .map(|u| format!("{}: {}", u.submission_id, u.url)),
            self.config.sample_size,
        );
        report.orphaned = Some(orphaned);

        if !options.dry_run {
            let (deleted, errors) = self.delete(&orphans, blob_store).await;
            report.deleted = Some(deleted);
            report.errors.extend(errors);
        }

        report.duration_ms = elapsed_ms(start);
        info!(
            mode = options.mode().as_str(),
            deleted = report.deleted.as_ref().map(KindCounts::total),
            errors_count = report.errors.len(),
            duration_ms = report.duration_ms,
            "Orphan reconciliation completed"
        );
        Ok(report)
    }

    /// Read every collection concurrently, plus the bucket if requested.
    ///
    /// Counts of the reads that completed are recorded even on failure.
    async fn scan(
        &self,
        blobs: Option<&dyn BlobStore>,
        scanned: &mut ScannedCounts,
    ) -> Result<Snapshot, (ScanError, Vec<String>)> {
        let policy = RetryPolicy::from(&self.config.scan);
        let tables = &self.config.tables;
        let store = self.documents.as_ref();

        let listing = async {
            match blobs {
                Some(blobs) => read_blob_keys(blobs, &self.config.bucket, policy)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (courses, assignments, submissions, peer_responses, blob_keys) = tokio::join!(
            read_collection::<Course>(store, &tables.courses, policy),
            read_collection::<Assignment>(store, &tables.assignments, policy),
            read_collection::<Submission>(store, &tables.submissions, policy),
            read_collection::<PeerResponse>(store, &tables.peer_responses, policy),
            listing,
        );

        scanned.courses = courses.as_ref().ok().map(Vec::len);
        scanned.assignments = assignments.as_ref().ok().map(Vec::len);
        scanned.submissions = submissions.as_ref().ok().map(Vec::len);
        scanned.peer_responses = peer_responses.as_ref().ok().map(Vec::len);
        scanned.blob_objects = blob_keys.as_ref().ok().and_then(|k| k.as_ref().map(Vec::len));

        let mut failures = Vec::new();
        let snapshot = Snapshot {
            courses: settle(courses, &mut failures),
            assignments: settle(assignments, &mut failures),
            submissions: settle(submissions, &mut failures),
            peer_responses: settle(peer_responses, &mut failures),
            blob_keys: settle(blob_keys, &mut failures),
        };
        // The first failure aborts the run; the rest are only reported.
        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(snapshot),
            Some(first) => Err((first, failures.map(|e| e.to_string()).collect())),
        }
    }

    fn orphan_counts(&self, orphans: &OrphanSets) -> KindCounts {
        let n = self.config.sample_size;
        KindCounts {
            assignments: KindSummary::from_ids(
                orphans.assignments.iter().map(|a| a.assignment_id.as_str()),
                n,
            ),
            submissions: KindSummary::from_ids(
                orphans.submissions.iter().map(|s| s.submission_id.as_str()),
                n,
            ),
            peer_responses: KindSummary::from_ids(
                orphans
                    .peer_responses
                    .iter()
                    .map(|r| r.any_identity().unwrap_or("<unidentified>")),
                n,
            ),
            blob_objects: orphans
                .blobs
                .as_ref()
                .map(|keys| KindSummary::from_ids(keys.iter().map(String::as_str), n)),
        }
    }

    async fn run_phase<F>(&self, kind: OrphanKind, phase: F) -> KindTally
    where
        F: Future<Output = KindTally>,
    {
        let start = Instant::now();
        let tally = phase.await;
        info!(
            kind = %kind,
            deleted = tally.deleted,
            batches = tally.batches,
            errors_count = tally.errors.len(),
            duration_ms = elapsed_ms(start),
            "Deleted orphans"
        );
        tally
    }

    /// Delete every orphan kind in turn: peer responses, submissions,
    /// assignments, then blobs.
    async fn delete(
        &self,
        orphans: &OrphanSets,
        blobs: Option<&dyn BlobStore>,
    ) -> (KindCounts, Vec<String>) {
        let store = self.documents.as_ref();
        let tables = &self.config.tables;
        let documents = BatchPlan {
            cap: self.config.batch_caps.document,
            sample_size: self.config.sample_size,
        };

        let peer_responses = self
            .run_phase(
                OrphanKind::PeerResponses,
                delete_peer_responses(store, &tables.peer_responses, &orphans.peer_responses, documents),
            )
            .await;

        let submission_ids: Vec<String> = orphans
            .submissions
            .iter()
            .map(|s| s.submission_id.clone())
            .collect();
        let submissions = self
            .run_phase(
                OrphanKind::Submissions,
                delete_documents(
                    store,
                    OrphanKind::Submissions,
                    &tables.submissions,
                    Submission::KEY_ATTRIBUTE,
                    &submission_ids,
                    documents,
                ),
            )
            .await;

        let assignment_ids: Vec<String> = orphans
            .assignments
            .iter()
            .map(|a| a.assignment_id.clone())
            .collect();
        let assignments = self
            .run_phase(
                OrphanKind::Assignments,
                delete_documents(
                    store,
                    OrphanKind::Assignments,
                    &tables.assignments,
                    Assignment::KEY_ATTRIBUTE,
                    &assignment_ids,
                    documents,
                ),
            )
            .await;

        let blob_objects = match (blobs, &orphans.blobs) {
            (Some(blobs), Some(keys)) => {
                let plan = BatchPlan {
                    cap: self.config.batch_caps.blob,
                    sample_size: self.config.sample_size,
                };
                Some(
                    self.run_phase(
                        OrphanKind::BlobObjects,
                        delete_blobs(blobs, &self.config.bucket, keys, plan),
                    )
                    .await,
                )
            }
            _ => None,
        };

        let errors = [&peer_responses, &submissions, &assignments]
            .into_iter()
            .chain(blob_objects.as_ref())
            .flat_map(|tally| tally.errors.iter().cloned())
            .collect();
        let deleted = KindCounts {
            assignments: assignments.summary(),
            submissions: submissions.summary(),
            peer_responses: peer_responses.summary(),
            blob_objects: blob_objects.as_ref().map(KindTally::summary),
        };
        (deleted, errors)
    }
}
