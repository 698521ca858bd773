use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use common::storage::{BLOB_BATCH_LIMIT, DOCUMENT_BATCH_LIMIT, validate_name};

pub use common::config::{BlobBackend, DatabaseConfig, FilesystemConfig, S3Config, StorageConfig};

/// Physical table names of the record collections.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TableNames {
    #[serde(default = "default_courses_table")]
    pub courses: String,
    #[serde(default = "default_assignments_table")]
    pub assignments: String,
    #[serde(default = "default_submissions_table")]
    pub submissions: String,
    #[serde(default = "default_peer_responses_table")]
    pub peer_responses: String,
}

fn default_courses_table() -> String {
    "courses".into()
}
fn default_assignments_table() -> String {
    "assignments".into()
}
fn default_submissions_table() -> String {
    "submissions".into()
}
fn default_peer_responses_table() -> String {
    "peer-responses".into()
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            courses: default_courses_table(),
            assignments: default_assignments_table(),
            submissions: default_submissions_table(),
            peer_responses: default_peer_responses_table(),
        }
    }
}

impl TableNames {
    pub fn all(&self) -> [&str; 4] {
        [
            &self.courses,
            &self.assignments,
            &self.submissions,
            &self.peer_responses,
        ]
    }
}

/// Items per bulk delete call. Cannot exceed the stores' hard limits.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BatchCaps {
    /// Document-store bulk delete size. Default: 25.
    #[serde(default = "default_document_cap")]
    pub document: usize,
    /// Blob-store bulk delete size. Default: 1000.
    #[serde(default = "default_blob_cap")]
    pub blob: usize,
}

fn default_document_cap() -> usize {
    DOCUMENT_BATCH_LIMIT
}
fn default_blob_cap() -> usize {
    BLOB_BATCH_LIMIT
}

impl Default for BatchCaps {
    fn default() -> Self {
        Self {
            document: default_document_cap(),
            blob: default_blob_cap(),
        }
    }
}

/// Settings of the reconciliation pass itself.
#[derive(Debug, Deserialize, Clone)]
pub struct GcConfig {
    /// Bucket holding submission media. Default: "course-media".
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub tables: TableNames,
    #[serde(default)]
    pub batch_caps: BatchCaps,
    /// Key prefixes never reclaimed. Default: ["profile-pictures/", "system/"].
    #[serde(default = "default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,
    #[serde(default)]
    pub scan: ScanConfig,
    /// Identifying examples kept per kind in the report. Default: 10.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_bucket() -> String {
    "course-media".into()
}
fn default_protected_prefixes() -> Vec<String> {
    vec!["profile-pictures/".into(), "system/".into()]
}
fn default_sample_size() -> usize {
    10
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            tables: TableNames::default(),
            batch_caps: BatchCaps::default(),
            protected_prefixes: default_protected_prefixes(),
            scan: ScanConfig::default(),
            sample_size: default_sample_size(),
        }
    }
}

impl GcConfig {
    /// Check values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_caps.document == 0 || self.batch_caps.document > DOCUMENT_BATCH_LIMIT {
            return Err(ConfigError::Message(format!(
                "gc.batch_caps.document must be between 1 and {DOCUMENT_BATCH_LIMIT}, got {}",
                self.batch_caps.document
            )));
        }
        if self.batch_caps.blob == 0 || self.batch_caps.blob > BLOB_BATCH_LIMIT {
            return Err(ConfigError::Message(format!(
                "gc.batch_caps.blob must be between 1 and {BLOB_BATCH_LIMIT}, got {}",
                self.batch_caps.blob
            )));
        }
        for name in self.tables.all().into_iter().chain([self.bucket.as_str()]) {
            validate_name(name).map_err(|e| ConfigError::Message(e.to_string()))?;
        }
        if self.protected_prefixes.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Message(
                "gc.protected_prefixes must not contain an empty prefix".into(),
            ));
        }
        Ok(())
    }
}

/// Page-fetch settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Documents requested per page. Default: 100.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Retries of a failed page fetch before the scan aborts. Default: 2.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Backoff base in milliseconds. Default: 200.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds. Default: 5000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_page_size() -> u64 {
    100
}
fn default_max_retries() -> u8 {
    2
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Janitor application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct JanitorAppConfig {
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl JanitorAppConfig {
    /// Load from defaults, then `path` (or `JANITOR_CONFIG`, or `config/config`),
    /// then `JANITOR__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_string(),
            None => {
                std::env::var("JANITOR_CONFIG").unwrap_or_else(|_| "config/config".to_string())
            }
        };

        let s = Config::builder()
            .set_default("gc.bucket", default_bucket())?
            .set_default("gc.batch_caps.document", DOCUMENT_BATCH_LIMIT as i64)?
            .set_default("gc.batch_caps.blob", BLOB_BATCH_LIMIT as i64)?
            .set_default("gc.protected_prefixes", default_protected_prefixes())?
            .set_default("storage.backend", "s3")?
            // Explicit paths must exist; the default location is optional.
            .add_source(File::with_name(&config_path).required(path.is_some()))
            // Override from environment (e.g., JANITOR__GC__BUCKET)
            .add_source(
                Environment::with_prefix("JANITOR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("gc.protected_prefixes")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.gc.validate()?;
        Ok(config)
    }
}
