//! Persistence strategy abstraction for semantic models.
//!
//! The [`ModelStore`] trait defines the byte-level document contract every
//! backend implements: a model lives at a logical path as a manifest
//! (`semanticmodel.json`) plus, in split mode, one document per entity
//! under `tables/`, `views/`, and `storedprocedures/`. Backends are fully
//! interchangeable; the repository never branches on backend type, and
//! selection is a configuration value resolved by [`build_store`].
//!
//! Strategies are stateless per call and do no caching — that belongs to
//! the repository layer.
//!
//! # Backends
//!
//! | Strategy | Module | Medium |
//! |----------|--------|--------|
//! | `local-disk` | [`local`] | Directory tree |
//! | `blob` | [`blob`] | S3-compatible bucket |
//! | `document-db` | [`document`] | SQLite document tables |

pub mod blob;
pub mod document;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::StoreError;
use crate::model::{StoredProcedure, Table, View};

/// Manifest file name at the root of every persisted model.
pub const MANIFEST_FILE: &str = "semanticmodel.json";

/// How entity bodies are laid out on the storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Each entity is an individually addressable document referenced from
    /// the manifest by relative path. Enables lazy loading and partial
    /// saves.
    Split,
    /// The manifest inlines every entity body; no per-entity documents.
    SingleFile,
}

/// One entity reference in a manifest: identity plus either a relative
/// document path (split mode) or an inline body (single-file mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry<T> {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<T>,
}

/// The top-level model manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tables: Vec<ManifestEntry<Table>>,
    #[serde(default)]
    pub views: Vec<ManifestEntry<View>>,
    #[serde(default)]
    pub stored_procedures: Vec<ManifestEntry<StoredProcedure>>,
}

/// Abstract persistence backend for semantic models.
///
/// `model_path` is the logical path of the model (a directory, a
/// container-relative name, or a document key prefix depending on the
/// backend); `relative_path` addresses one document within it, e.g.
/// `semanticmodel.json` or `tables/dbo.Customer.json`.
///
/// An absent document must surface as [`StoreError::NotFound`], kept
/// distinct from generic I/O failure so the repository's empty-model
/// recovery applies only to that case.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Strategy identifier used in cache keys and configuration.
    fn name(&self) -> &str;

    /// Read one document's raw bytes.
    async fn read_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, StoreError>;

    /// Write (create or replace) one document.
    async fn write_document(
        &self,
        model_path: &str,
        relative_path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError>;

    /// Delete one document. Deleting an absent document is not an error.
    async fn delete_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<(), StoreError>;

    /// Read and deserialize the model manifest.
    async fn read_manifest(&self, model_path: &str) -> Result<ModelManifest, StoreError> {
        let bytes = self.read_document(model_path, MANIFEST_FILE).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize and write the model manifest.
    async fn write_manifest(
        &self,
        model_path: &str,
        manifest: &ModelManifest,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.write_document(model_path, MANIFEST_FILE, &bytes).await
    }

    /// Whether a manifest exists at the path.
    async fn manifest_exists(&self, model_path: &str) -> Result<bool, StoreError> {
        match self.read_document(model_path, MANIFEST_FILE).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Instantiate the persistence strategy selected by the configuration.
///
/// Fails fast with [`StoreError::Config`] when the selected backend's
/// settings are absent or invalid, before any I/O is attempted.
pub async fn build_store(config: &Config) -> Result<Arc<dyn ModelStore>, StoreError> {
    match config.storage.strategy.as_str() {
        local::STRATEGY_NAME => {
            let settings = config.storage.local.as_ref().ok_or_else(|| {
                StoreError::Config("[storage.local] section required for local-disk".to_string())
            })?;
            Ok(Arc::new(local::LocalDiskStore::new(settings)?))
        }
        blob::STRATEGY_NAME => {
            let settings = config.storage.blob.as_ref().ok_or_else(|| {
                StoreError::Config("[storage.blob] section required for blob".to_string())
            })?;
            Ok(Arc::new(blob::BlobStore::new(settings)?))
        }
        document::STRATEGY_NAME => {
            let settings = config.storage.document.as_ref().ok_or_else(|| {
                StoreError::Config(
                    "[storage.document] section required for document-db".to_string(),
                )
            })?;
            Ok(Arc::new(document::DocumentDbStore::connect(settings).await?))
        }
        other => Err(StoreError::Config(format!(
            "unknown storage strategy: {} (use local-disk, blob, or document-db)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_entry_split_mode_shape() {
        let entry: ManifestEntry<Table> = ManifestEntry {
            schema: "dbo".to_string(),
            name: "Customer".to_string(),
            path: Some("tables/dbo.Customer.json".to_string()),
            entity: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "tables/dbo.Customer.json");
        assert!(json.get("entity").is_none());
    }

    #[test]
    fn test_manifest_roundtrip_without_entities() {
        let manifest = ModelManifest {
            name: "shop".to_string(),
            source: "server=.;db=shop".to_string(),
            description: Some("retail database".to_string()),
            tables: Vec::new(),
            views: Vec::new(),
            stored_procedures: Vec::new(),
        };
        let bytes = serde_json::to_vec(&manifest).unwrap();
        let back: ModelManifest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.name, "shop");
        assert!(back.tables.is_empty());
    }
}
