use serde::Deserialize;

/// Document store connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Default: "postgres://localhost/classroom".
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections. Default: 8.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Per-statement connect/acquire timeout in seconds. Default: 10.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/classroom".into()
}
fn default_max_connections() -> u32 {
    8
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Which blob store implementation to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    #[default]
    S3,
    Filesystem,
}

/// S3-compatible object storage settings.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    /// Region name. Default: "us-east-1".
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Uses the AWS endpoint for `region` when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static credentials. Falls back to the standard AWS environment/profile chain when unset.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`). Default: false.
    #[serde(default)]
    pub path_style: bool,
    /// Concurrent per-object requests within one delete batch. Default: 32.
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Keys requested per listing page. Default: 1000.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_region() -> String {
    "us-east-1".into()
}
fn default_delete_concurrency() -> usize {
    32
}
fn default_list_page_size() -> usize {
    1000
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            delete_concurrency: default_delete_concurrency(),
            list_page_size: default_list_page_size(),
        }
    }
}

/// Local directory used as a blob store.
#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConfig {
    /// Base directory; each bucket is a sub-directory. Default: "./data/blobs".
    #[serde(default = "default_fs_path")]
    pub path: String,
}

fn default_fs_path() -> String {
    "./data/blobs".into()
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            path: default_fs_path(),
        }
    }
}

/// Blob store settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BlobBackend,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
}
