use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::vector::VectorIndexConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub vector: Option<VectorIndexConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Name of the project's database; also the name given to the empty
    /// model built when a load target does not exist.
    pub database_name: String,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub local: Option<LocalStorageConfig>,
    #[serde(default)]
    pub blob: Option<BlobStorageConfig>,
    #[serde(default)]
    pub document: Option<DocumentStorageConfig>,
}

fn default_strategy() -> String {
    "local-disk".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalStorageConfig {
    /// Root directory under which model paths are resolved.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobStorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentStorageConfig {
    /// SQLite database file backing the document store.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    #[serde(default = "default_true")]
    pub lazy_loading: bool,
    #[serde(default = "default_true")]
    pub change_tracking: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_operations: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            lazy_loading: true,
            change_tracking: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            max_concurrent_operations: default_max_concurrent(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_max_concurrent() -> usize {
    8
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.storage.database_name.trim().is_empty() {
        anyhow::bail!("storage.database_name must not be empty");
    }

    if config.repository.max_concurrent_operations == 0 {
        anyhow::bail!("repository.max_concurrent_operations must be > 0");
    }

    match config.storage.strategy.as_str() {
        "local-disk" | "blob" | "document-db" => {}
        other => anyhow::bail!(
            "Unknown storage strategy: '{}'. Must be local-disk, blob, or document-db.",
            other
        ),
    }

    // Vector misconfiguration is reported as one batch of violations.
    if let Some(vector) = &config.vector {
        vector.validate()?;
    }

    Ok(config)
}
