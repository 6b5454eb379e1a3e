use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Every environment variable / CLI flag enumerated in the system spec,
/// loadable from the CLI, the environment, or (in tests) constructed
/// directly — no hidden global state.
#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    /// Directory hosting per-tenant subdirectories
    #[clap(long, env = "DOCUMENTS_ROOT", default_value_os_t = default_documents_root())]
    #[serde(default = "default_documents_root")]
    pub documents_root: PathBuf,

    /// Connection string for the catalog store
    #[clap(long, env = "CATALOG_URL", default_value_t = default_catalog_url())]
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// Directory to store logs and other persistent runtime state
    #[clap(long, env = "INDEX_DIR", default_value_os_t = default_index_dir())]
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    #[clap(long, env = "HOST", default_value_t = default_host())]
    #[serde(default = "default_host")]
    pub host: String,

    #[clap(long, env = "PORT", default_value_t = default_port())]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the embedding collaborator
    #[clap(long, env = "EMBEDDING_MODEL", default_value_t = default_embedding_model())]
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Declared vector dimension; must match the embedding collaborator
    #[clap(long, env = "EMBEDDING_DIM", default_value_t = default_embedding_dim())]
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[clap(long, env = "CHUNK_SIZE", default_value_t = default_chunk_size())]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[clap(long, env = "CHUNK_OVERLAP", default_value_t = default_chunk_overlap())]
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[clap(long, env = "BATCH_MIN", default_value_t = default_batch_min())]
    #[serde(default = "default_batch_min")]
    pub batch_min: usize,

    #[clap(long, env = "BATCH_MAX", default_value_t = default_batch_max())]
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,

    #[clap(long, env = "BATCH_CONCURRENCY", default_value_t = default_batch_concurrency())]
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    #[clap(long, env = "BASE_TIMEOUT", default_value_t = default_base_timeout())]
    #[serde(default = "default_base_timeout")]
    pub base_timeout_seconds: i64,

    #[clap(long, env = "PER_FILE_TIMEOUT", default_value_t = default_per_file_timeout())]
    #[serde(default = "default_per_file_timeout")]
    pub per_file_timeout_seconds: i64,

    #[clap(long, env = "MIN_TIMEOUT", default_value_t = default_min_timeout())]
    #[serde(default = "default_min_timeout")]
    pub min_timeout_seconds: i64,

    #[clap(long, env = "MAX_TIMEOUT", default_value_t = default_max_timeout())]
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: i64,

    #[clap(long, env = "HEARTBEAT_INTERVAL", default_value_t = default_heartbeat_interval())]
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,

    #[clap(long, env = "STUCK_MULTIPLIER", default_value_t = default_stuck_multiplier())]
    #[serde(default = "default_stuck_multiplier")]
    pub stuck_multiplier: f64,

    #[clap(long, env = "CLEANUP_INTERVAL", default_value_t = default_cleanup_interval())]
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    /// Bootstrap admin credential; gates the reserved `admin` tenant slug
    #[clap(long, env = "ADMIN_API_KEY", default_value_t = default_admin_api_key())]
    #[serde(default = "default_admin_api_key")]
    pub admin_api_key: String,

    /// Bounded wall clock for `/query` and `/query/search` (§7)
    #[clap(long, env = "QUERY_TIMEOUT", default_value_t = default_query_timeout())]
    #[serde(default = "default_query_timeout")]
    pub query_timeout_seconds: u64,
}

impl Configuration {
    pub fn log_dir(&self) -> PathBuf {
        self.index_dir.join("logs")
    }

    pub fn tenant_root(&self, tenant_slug: &str) -> PathBuf {
        self.documents_root.join(tenant_slug)
    }
}

fn default_documents_root() -> PathBuf {
    "documents".into()
}

fn default_catalog_url() -> String {
    "sqlite://ragctl.db".to_owned()
}

fn default_index_dir() -> PathBuf {
    match directories::ProjectDirs::from("dev", "ragctl", "ragctl") {
        Some(dirs) => dirs.data_dir().to_owned(),
        None => "ragctl_data".into(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    4242
}

fn default_embedding_model() -> String {
    "hash-embedder-v1".to_owned()
}

fn default_embedding_dim() -> usize {
    384
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_batch_min() -> usize {
    4
}

fn default_batch_max() -> usize {
    64
}

fn default_batch_concurrency() -> usize {
    2
}

fn default_base_timeout() -> i64 {
    300
}

fn default_per_file_timeout() -> i64 {
    10
}

fn default_min_timeout() -> i64 {
    300
}

fn default_max_timeout() -> i64 {
    7200
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_stuck_multiplier() -> f64 {
    2.0
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_admin_api_key() -> String {
    "changeme".to_owned()
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            documents_root: default_documents_root(),
            catalog_url: default_catalog_url(),
            index_dir: default_index_dir(),
            host: default_host(),
            port: default_port(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_min: default_batch_min(),
            batch_max: default_batch_max(),
            batch_concurrency: default_batch_concurrency(),
            base_timeout_seconds: default_base_timeout(),
            per_file_timeout_seconds: default_per_file_timeout(),
            min_timeout_seconds: default_min_timeout(),
            max_timeout_seconds: default_max_timeout(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            stuck_multiplier: default_stuck_multiplier(),
            cleanup_interval_seconds: default_cleanup_interval(),
            admin_api_key: default_admin_api_key(),
            query_timeout_seconds: default_query_timeout(),
        }
    }
}
