//! Run report: the single output artifact of a reconciliation pass.

use std::fmt;

use serde::Serialize;

/// Whether the run was allowed to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry run",
            Self::Apply => "apply",
        }
    }
}

/// Kinds of reclaimable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrphanKind {
    PeerResponses,
    Submissions,
    Assignments,
    BlobObjects,
}

impl OrphanKind {
    /// Order in which kinds are deleted: children before parents, blobs last.
    pub const DELETE_ORDER: [Self; 4] = [
        Self::PeerResponses,
        Self::Submissions,
        Self::Assignments,
        Self::BlobObjects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerResponses => "peerResponses",
            Self::Submissions => "submissions",
            Self::Assignments => "assignments",
            Self::BlobObjects => "blobObjects",
        }
    }
}

impl fmt::Display for OrphanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A count plus a few identifying examples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub count: usize,
    pub sample: Vec<String>,
}

impl KindSummary {
    /// Summarise `ids`, keeping the first `sample_size` of them.
    pub fn from_ids<I>(ids: I, sample_size: usize) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut summary = Self::default();
        for id in ids {
            if summary.sample.len() < sample_size {
                summary.sample.push(id.into());
            }
            summary.count += 1;
        }
        summary
    }
}

/// Records and keys read during the scan phase. `None` means not read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedCounts {
    pub courses: Option<usize>,
    pub assignments: Option<usize>,
    pub submissions: Option<usize>,
    pub peer_responses: Option<usize>,
    pub blob_objects: Option<usize>,
}

/// Per-kind summaries, shared by the orphaned and deleted sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub assignments: KindSummary,
    pub submissions: KindSummary,
    pub peer_responses: KindSummary,
    /// `None` when blob cleanup was not requested.
    pub blob_objects: Option<KindSummary>,
}

impl KindCounts {
    pub fn get(&self, kind: OrphanKind) -> Option<&KindSummary> {
        match kind {
            OrphanKind::PeerResponses => Some(&self.peer_responses),
            OrphanKind::Submissions => Some(&self.submissions),
            OrphanKind::Assignments => Some(&self.assignments),
            OrphanKind::BlobObjects => self.blob_objects.as_ref(),
        }
    }

    pub fn total(&self) -> usize {
        OrphanKind::DELETE_ORDER
            .iter()
            .filter_map(|kind| self.get(*kind))
            .map(|summary| summary.count)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub mode: RunMode,
    pub scanned: ScannedCounts,
    /// `None` when the run aborted before analysis.
    pub orphaned: Option<KindCounts>,
    /// Present only in apply mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<KindCounts>,
    pub errors: Vec<String>,
    /// Submission URLs that resolved to no storage key, as `submissionId: url`.
    pub unresolved_urls: KindSummary,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            scanned: ScannedCounts::default(),
            orphaned: None,
            deleted: None,
            errors: Vec::new(),
            unresolved_urls: KindSummary::default(),
            duration_ms: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn count(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn write_kinds(f: &mut fmt::Formatter<'_>, title: &str, counts: &KindCounts) -> fmt::Result {
    writeln!(f, "{title}:")?;
    for kind in OrphanKind::DELETE_ORDER {
        let Some(summary) = counts.get(kind) else {
            continue;
        };
        write!(f, "  {:<14} {:>7}", kind.as_str(), summary.count)?;
        if !summary.sample.is_empty() {
            write!(f, "  e.g. {}", summary.sample.join(", "))?;
            if summary.count > summary.sample.len() {
                write!(f, ", ...")?;
            }
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Orphan reconciliation ({}) finished in {} ms",
            self.mode.as_str(),
            self.duration_ms
        )?;
        writeln!(
            f,
            "Scanned: courses={} assignments={} submissions={} peerResponses={} blobObjects={}",
            count(self.scanned.courses),
            count(self.scanned.assignments),
            count(self.scanned.submissions),
            count(self.scanned.peer_responses),
            count(self.scanned.blob_objects),
        )?;
        match &self.orphaned {
            Some(orphaned) => write_kinds(f, "Orphaned", orphaned)?,
            None => writeln!(f, "Orphaned: not analysed")?,
        }
        if let Some(deleted) = &self.deleted {
            write_kinds(f, "Deleted", deleted)?;
        }
        if self.unresolved_urls.count > 0 {
            writeln!(f, "Unresolved URLs: {}", self.unresolved_urls.count)?;
            for url in &self.unresolved_urls.sample {
                writeln!(f, "  {url}")?;
            }
        }
        if self.errors.is_empty() {
            writeln!(f, "Errors: none")
        } else {
            writeln!(f, "Errors ({}):", self.errors.len())?;
            for error in &self.errors {
                writeln!(f, "  - {error}")?;
            }
            Ok(())
        }
    }
}
