//! Document-database [`ModelStore`] implementation over SQLite.
//!
//! Every model document (the manifest and each entity body) is a row in
//! one table keyed by `(model_path, relative_path)`, so the same
//! split/single-file layout as the other backends maps onto document
//! upserts. Uses a WAL-mode connection pool in the same shape as the
//! other SQLite plumbing in this codebase.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::config::DocumentStorageConfig;
use crate::error::StoreError;

use super::ModelStore;

pub const STRATEGY_NAME: &str = "document-db";

/// SQLite-backed persistence strategy.
#[derive(Debug)]
pub struct DocumentDbStore {
    pool: SqlitePool,
}

impl DocumentDbStore {
    /// Open (or create) the backing database and ensure the schema.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] when the path is empty;
    /// [`StoreError::Backend`] when the database cannot be opened.
    pub async fn connect(config: &DocumentStorageConfig) -> Result<Self, StoreError> {
        if config.path.as_os_str().is_empty() {
            return Err(StoreError::Config(
                "storage.document.path must not be empty".to_string(),
            ));
        }

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to open document db: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_documents (
                model_path TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                body BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (model_path, relative_path)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to create schema: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn canonical(model_path: &str) -> String {
    model_path.trim_matches('/').to_string()
}

#[async_trait]
impl ModelStore for DocumentDbStore {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn read_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let row = sqlx::query(
            "SELECT body FROM model_documents WHERE model_path = ? AND relative_path = ?",
        )
        .bind(canonical(model_path))
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(row.get::<Vec<u8>, _>("body")),
            None => Err(StoreError::NotFound(format!(
                "{}/{}",
                canonical(model_path),
                relative_path
            ))),
        }
    }

    async fn write_document(
        &self,
        model_path: &str,
        relative_path: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO model_documents (model_path, relative_path, body, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(model_path, relative_path) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(canonical(model_path))
        .bind(relative_path)
        .bind(bytes)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_document(
        &self,
        model_path: &str,
        relative_path: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM model_documents WHERE model_path = ? AND relative_path = ?")
            .bind(canonical(model_path))
            .bind(relative_path)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MANIFEST_FILE;

    async fn open_store() -> (tempfile::TempDir, DocumentDbStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = DocumentDbStore::connect(&DocumentStorageConfig {
            path: tmp.path().join("models.sqlite"),
        })
        .await
        .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_empty_path_is_config_error() {
        let err = DocumentDbStore::connect(&DocumentStorageConfig {
            path: std::path::PathBuf::new(),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_body() {
        let (_tmp, store) = open_store().await;
        store
            .write_document("shop", MANIFEST_FILE, b"first")
            .await
            .unwrap();
        store
            .write_document("shop", MANIFEST_FILE, b"second")
            .await
            .unwrap();
        let bytes = store.read_document("shop", MANIFEST_FILE).await.unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let (_tmp, store) = open_store().await;
        let err = store.read_document("shop", MANIFEST_FILE).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_model_paths_do_not_collide() {
        let (_tmp, store) = open_store().await;
        store
            .write_document("shop", MANIFEST_FILE, b"shop")
            .await
            .unwrap();
        store
            .write_document("warehouse", MANIFEST_FILE, b"warehouse")
            .await
            .unwrap();
        assert_eq!(
            store.read_document("/shop/", MANIFEST_FILE).await.unwrap(),
            b"shop"
        );
    }
}
