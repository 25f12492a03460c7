//! Local-directory [`ModelStore`] implementation.
//!
//! Persists a model as a directory tree under the configured root:
//!
//! ```text
//! {root}/{model-path}/semanticmodel.json
//! {root}/{model-path}/tables/{Schema}.{Name}.json
//! {root}/{model-path}/views/{Schema}.{Name}.json
//! {root}/{model-path}/storedprocedures/{Schema}.{Name}.json
//! ```
//!
//! All I/O goes through `tokio::fs`. A missing configured root is a
//! configuration error raised at construction, before any I/O attempt.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::LocalStorageConfig;
use crate::error::StoreError;

use super::ModelStore;

pub const STRATEGY_NAME: &str = "local-disk";

/// Filesystem-backed persistence strategy.
#[derive(Debug)]
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    /// Create the store from configuration.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] when the configured root is empty. The root
    /// is not required to exist yet; directories are created on first write.
    pub fn new(config: &LocalStorageConfig) -> Result<Self, StoreError> {
        if config.root.as_os_str().is_empty() {
            return Err(StoreError::Config(
                "storage.local.root must not be empty".to_string(),
            ));
        }
        Ok(Self {
            root: config.root.clone(),
        })
    }

    /// Create the store directly over a root directory (used by tests and
    /// callers that manage configuration themselves).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, model_path: &str, relative_path: &str) -> PathBuf {
        self.root
            .join(model_path.trim_matches('/'))
            .join(relative_path)
    }
}

fn map_io(err: std::io::Error, path: &Path) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(path.display().to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl ModelStore for LocalDiskStore {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn read_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let path = self.document_path(model_path, relative_path);
        tokio::fs::read(&path).await.map_err(|e| map_io(e, &path))
    }

    async fn write_document(
        &self,
        model_path: &str,
        relative_path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let path = self.document_path(model_path, relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn delete_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<(), StoreError> {
        let path = self.document_path(model_path, relative_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
