use common::storage::StorageError;
use thiserror::Error;

use crate::report::RunReport;

/// A paginated read that could not complete. Fatal to the run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read `{source_name}` after {attempts} attempt(s): {error}")]
    Page {
        source_name: String,
        attempts: u32,
        #[source]
        error: StorageError,
    },

    #[error("malformed record in `{source_name}`: {error}")]
    Decode {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum JanitorError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("blob cleanup requested but no blob store is configured")]
    MissingBlobStore,

    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),
}

/// A run that stopped before the delete phase.
///
/// Carries the partial report so the operator still sees what was collected.
#[derive(Debug, Error)]
#[error("reconciliation aborted: {error}")]
pub struct RunAborted {
    pub report: RunReport,
    #[source]
    pub error: JanitorError,
}

pub type Result<T> = std::result::Result<T, JanitorError>;
