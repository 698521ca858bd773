mod error;
mod traits;

pub mod filesystem;
pub mod memory;
#[cfg(feature = "sea-orm")]
pub mod postgres;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use traits::{
    BLOB_BATCH_LIMIT, BatchDeleteOutcome, BlobStore, DOCUMENT_BATCH_LIMIT, Document,
    DocumentStore, Page, Rejection, check_batch_size, validate_name,
};
