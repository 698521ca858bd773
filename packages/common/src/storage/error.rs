use std::fmt;

/// Errors that can occur while talking to a document or blob store.
#[derive(Debug)]
pub enum StorageError {
    /// The requested table, bucket or object was not found.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The pagination cursor could not be interpreted by the store.
    InvalidCursor(String),
    /// A table or bucket name contains characters the store does not accept.
    InvalidName(String),
    /// A delete request exceeded the store's hard per-call limit.
    BatchTooLarge { actual: usize, limit: usize },
    /// A stored document could not be decoded.
    Decode(String),
    /// The backend rejected or failed the call.
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidCursor(cursor) => write!(f, "invalid pagination cursor: {cursor}"),
            Self::InvalidName(name) => write!(f, "invalid table or bucket name: {name:?}"),
            Self::BatchTooLarge { actual, limit } => {
                write!(f, "batch of {actual} items exceeds the store limit of {limit}")
            }
            Self::Decode(msg) => write!(f, "malformed document: {msg}"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "sea-orm")]
impl From<sea_orm::DbErr> for StorageError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(feature = "object-storage")]
impl From<::s3::error::S3Error> for StorageError {
    fn from(err: ::s3::error::S3Error) -> Self {
        Self::Backend(err.to_string())
    }
}
