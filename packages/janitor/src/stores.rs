//! Store construction from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use common::storage::filesystem::FilesystemBlobStore;
use common::storage::postgres::PostgresDocumentStore;
use common::storage::s3::S3BlobStore;
use common::storage::{BLOB_BATCH_LIMIT, BlobStore, DocumentStore, StorageError};
use tracing::info;

use crate::config::{BlobBackend, JanitorAppConfig, StorageConfig};

/// Connect to the document database.
///
/// Tables are never created here: a missing table must fail the scan.
pub async fn connect_documents(
    config: &JanitorAppConfig,
) -> Result<Arc<dyn DocumentStore>, StorageError> {
    let store = PostgresDocumentStore::connect(&config.database, config.gc.scan.page_size).await?;
    info!(
        max_connections = config.database.max_connections,
        page_size = config.gc.scan.page_size,
        "Document store connected"
    );
    Ok(Arc::new(store))
}

/// Open the configured blob backend.
pub async fn open_blob_store(storage: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    let store: Arc<dyn BlobStore> = match storage.backend {
        BlobBackend::S3 => Arc::new(S3BlobStore::new(&storage.s3)?),
        BlobBackend::Filesystem => Arc::new(
            FilesystemBlobStore::new(PathBuf::from(&storage.filesystem.path), BLOB_BATCH_LIMIT)
                .await?,
        ),
    };
    info!(backend = ?storage.backend, "Blob store ready");
    Ok(store)
}
