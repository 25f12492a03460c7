//! Vector collection backends.
//!
//! [`VectorCollectionStore`] is the seam between the writer/search
//! services and whatever holds the vectors. The bundled implementation is
//! [`InMemoryVectorStore`]: `HashMap`s behind `std::sync::RwLock`, with
//! brute-force cosine similarity over every record in the collection.
//! Exhaustive scoring keeps ordering exact; it is the right trade for the
//! small and medium collections a single database schema produces.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;

use crate::error::VectorStoreError;

use super::{VectorIndexConfig, VectorProvider, VectorRecord};

/// A record paired with its similarity to the query vector.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// Backend holding named collections of [`VectorRecord`]s.
///
/// `upsert` must fail with [`VectorStoreError::CollectionMissing`] when
/// the collection does not exist; the writer relies on that signal for
/// its create-and-retry step. `query` returns records ordered by
/// descending similarity, at most `top_k` of them.
#[async_trait]
pub trait VectorCollectionStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError>;

    /// Insert or replace the record with the same id.
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), VectorStoreError>;

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// In-memory vector store. Records are keyed by id within each named
/// collection, so re-upserting an entity replaces its record.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide shared instance, so every service resolving the
    /// in-memory provider sees the same collections.
    pub fn global() -> Arc<InMemoryVectorStore> {
        static GLOBAL: OnceLock<Arc<InMemoryVectorStore>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(InMemoryVectorStore::new()))
            .clone()
    }

    pub fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().unwrap();
        collections.get(collection).map_or(0, |c| c.len())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorCollectionStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().unwrap();
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        let collections = self.collections.read().unwrap();
        Ok(collections.contains_key(name))
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().unwrap();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| VectorStoreError::CollectionMissing(collection.to_string()))?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let collections = self.collections.read().unwrap();
        let records = collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::CollectionMissing(collection.to_string()))?;

        let mut scored: Vec<ScoredRecord> = records
            .values()
            .map(|record| ScoredRecord {
                score: cosine_sim(query_vec, &record.embedding),
                record: record.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Resolve the configured provider to a concrete store.
///
/// `auto` and `in-memory` both land on the shared [`InMemoryVectorStore`].
/// The external providers pass validation (their settings are checked)
/// but have no binding in this crate, so resolving them is an error
/// rather than a silent fallback.
pub fn build_vector_store(
    config: &VectorIndexConfig,
) -> Result<Arc<dyn VectorCollectionStore>, VectorStoreError> {
    match config.provider {
        VectorProvider::Auto | VectorProvider::InMemory => Ok(InMemoryVectorStore::global()),
        VectorProvider::SearchApi => Err(VectorStoreError::Backend(
            "no search-api binding is available; use provider = \"in-memory\"".to_string(),
        )),
        VectorProvider::DocumentDb => Err(VectorStoreError::Backend(
            "no document-db vector binding is available; use provider = \"in-memory\"".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;

    fn record(name: &str, embedding: Vec<f32>) -> VectorRecord {
        let table = Table {
            schema: "dbo".to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        VectorRecord::new(table, embedding, "test-model")
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_sim(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_sim(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_sim(&[], &[]), 0.0);
        assert_eq!(cosine_sim(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_upsert_requires_collection() {
        let store = InMemoryVectorStore::new();
        let err = store
            .upsert("entities", record("Customer", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionMissing(_)));

        store.ensure_collection("entities").await.unwrap();
        store
            .upsert("entities", record("Customer", vec![1.0]))
            .await
            .unwrap();
        assert_eq!(store.len("entities"), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("entities").await.unwrap();
        store
            .upsert("entities", record("Customer", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert("entities", record("Customer", vec![0.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(store.len("entities"), 1);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("entities").await.unwrap();
        store
            .upsert("entities", record("Orders", vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .upsert("entities", record("Customer", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert("entities", record("Invoice", vec![0.7, 0.7]))
            .await
            .unwrap();

        let results = store.query("entities", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, "table_dbo_Customer");
        assert_eq!(results[1].record.id, "table_dbo_Invoice");
        assert!(results[0].score > results[1].score);
    }
}
