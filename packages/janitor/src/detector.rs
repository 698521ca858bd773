//! Referential graph and orphan detection.
//!
//! Pure set computation over one snapshot of the collections. Parent sets
//! are the full scanned sets, so a child of a parent that is itself an
//! orphan is only found on the next pass.

use std::collections::HashSet;

use common::{Assignment, Course, PeerResponse, Submission};

use crate::resolver::{KeyResolver, Resolution};

/// Everything one scan phase read.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub courses: Vec<Course>,
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<Submission>,
    pub peer_responses: Vec<PeerResponse>,
    /// Bucket listing; `None` when blob cleanup was not requested.
    pub blob_keys: Option<Vec<String>>,
}

/// Blob key prefixes exempt from reclamation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedPrefixes(Vec<String>);

impl ProtectedPrefixes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        )
    }

    pub fn covers(&self, key: &str) -> bool {
        self.0.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// A submission URL that could not be mapped to a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedUrl {
    pub submission_id: String,
    pub url: String,
}

/// Records and keys whose required parent does not resolve, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanSets {
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<Submission>,
    pub peer_responses: Vec<PeerResponse>,
    /// `None` when the snapshot has no bucket listing.
    pub blobs: Option<Vec<String>>,
    /// URLs excluded from the referenced-key set.
    pub unresolved_urls: Vec<UnresolvedUrl>,
}

impl OrphanSets {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
            && self.submissions.is_empty()
            && self.peer_responses.is_empty()
            && self.blobs.as_ref().is_none_or(Vec::is_empty)
    }
}

fn resolves(parent: Option<&str>, parents: &HashSet<&str>) -> bool {
    parent.is_some_and(|id| parents.contains(id))
}

/// Compute the orphan sets of a snapshot.
pub fn detect_orphans(
    snapshot: &Snapshot,
    resolver: &KeyResolver,
    protected: &ProtectedPrefixes,
) -> OrphanSets {
    let course_ids: HashSet<&str> = snapshot
        .courses
        .iter()
        .map(|c| c.course_id.as_str())
        .collect();
    let assignment_ids: HashSet<&str> = snapshot
        .assignments
        .iter()
        .map(|a| a.assignment_id.as_str())
        .collect();
    let submission_ids: HashSet<&str> = snapshot
        .submissions
        .iter()
        .map(|s| s.submission_id.as_str())
        .collect();

    let assignments = snapshot
        .assignments
        .iter()
        .filter(|a| !resolves(a.course_id.as_deref(), &course_ids))
        .cloned()
        .collect();
    let submissions = snapshot
        .submissions
        .iter()
        .filter(|s| !resolves(s.assignment_id.as_deref(), &assignment_ids))
        .cloned()
        .collect();
    let peer_responses = snapshot
        .peer_responses
        .iter()
        .filter(|r| !resolves(r.video_id.as_deref(), &submission_ids))
        .cloned()
        .collect();

    let mut unresolved_urls = Vec::new();
    let blobs = snapshot.blob_keys.as_ref().map(|listed| {
        // Referenced keys come from every submission, orphaned or not.
        let mut referenced: HashSet<String> = HashSet::new();
        for submission in &snapshot.submissions {
            for url in submission.blob_urls() {
                match resolver.resolve(url) {
                    Resolution::Resolved(key) => {
                        referenced.insert(key);
                    }
                    Resolution::Unresolvable => unresolved_urls.push(UnresolvedUrl {
                        submission_id: submission.submission_id.clone(),
                        url: url.to_string(),
                    }),
                }
            }
        }

        listed
            .iter()
            .filter(|key| !protected.covers(key) && !referenced.contains(key.as_str()))
            .cloned()
            .collect()
    });

    OrphanSets {
        assignments,
        submissions,
        peer_responses,
        blobs,
        unresolved_urls,
    }
}
