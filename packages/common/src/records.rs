use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The logical record collections the reconciliation job reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Courses,
    Assignments,
    Submissions,
    PeerResponses,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::Assignments => "assignments",
            Self::Submissions => "submissions",
            Self::PeerResponses => "peer_responses",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record type stored in one of the document collections.
pub trait Record: DeserializeOwned + Send + 'static {
    const COLLECTION: Collection;
}

/// Root entity. Has no parent within the reconciliation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
}

impl Course {
    pub const KEY_ATTRIBUTE: &'static str = "courseId";
}

impl Record for Course {
    const COLLECTION: Collection = Collection::Courses;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub assignment_id: String,
    /// Parent course. A missing value never resolves.
    #[serde(default)]
    pub course_id: Option<String>,
}

impl Assignment {
    pub const KEY_ATTRIBUTE: &'static str = "assignmentId";
}

impl Record for Assignment {
    const COLLECTION: Collection = Collection::Assignments;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: String,
    /// Parent assignment. A missing value never resolves.
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Submission {
    pub const KEY_ATTRIBUTE: &'static str = "submissionId";

    /// Blob URLs attached to this submission, in `videoUrl`, `thumbnailUrl` order.
    pub fn blob_urls(&self) -> impl Iterator<Item = &str> {
        [self.video_url.as_deref(), self.thumbnail_url.as_deref()]
            .into_iter()
            .flatten()
            .filter(|url| !url.trim().is_empty())
    }
}

impl Record for Submission {
    const COLLECTION: Collection = Collection::Submissions;
}

/// A peer response to a submission video.
///
/// The collection is not key-consistent: older records are keyed by `id`,
/// newer ones by `responseId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    /// The `submissionId` of the submission this response belongs to.
    #[serde(default)]
    pub video_id: Option<String>,
}

impl PeerResponse {
    /// Value of the given identity attribute, if populated.
    pub fn identity(&self, key: PeerResponseKey) -> Option<&str> {
        match key {
            PeerResponseKey::Id => self.id.as_deref(),
            PeerResponseKey::ResponseId => self.response_id.as_deref(),
        }
        .filter(|value| !value.is_empty())
    }

    /// Whichever identity is populated, preferring `id`.
    pub fn any_identity(&self) -> Option<&str> {
        self.identity(PeerResponseKey::Id)
            .or_else(|| self.identity(PeerResponseKey::ResponseId))
    }
}

impl Record for PeerResponse {
    const COLLECTION: Collection = Collection::PeerResponses;
}

/// Identity attribute used to address a peer response in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerResponseKey {
    Id,
    ResponseId,
}

impl PeerResponseKey {
    /// Select the key attribute from a record: `id` when populated, else `responseId`.
    pub fn select(record: &PeerResponse) -> Self {
        if record.identity(Self::Id).is_some() {
            Self::Id
        } else {
            Self::ResponseId
        }
    }

    /// The other attribute.
    pub fn other(self) -> Self {
        match self {
            Self::Id => Self::ResponseId,
            Self::ResponseId => Self::Id,
        }
    }

    /// Attribute name as stored in the document.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ResponseId => "responseId",
        }
    }
}

impl fmt::Display for PeerResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attribute())
    }
}
