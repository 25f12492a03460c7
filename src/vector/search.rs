//! Index writer and search service over a [`VectorCollectionStore`].
//!
//! The writer owns index-side resilience: a missing collection is created
//! and the write retried exactly once, so the first write to a fresh
//! deployment succeeds instead of requiring a provisioning step. A second
//! [`CollectionMissing`] is surfaced as-is.
//!
//! The search service validates arguments before touching the backend:
//! `top_k` must be positive, and an empty query vector short-circuits to
//! an empty result (nothing is meaningfully similar to nothing).
//!
//! [`CollectionMissing`]: VectorStoreError::CollectionMissing

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::VectorStoreError;

use super::{build_vector_store, ScoredRecord, VectorCollectionStore, VectorIndexConfig, VectorRecord};

/// Writes entity records into the configured collection.
pub struct VectorIndexWriter {
    store: Arc<dyn VectorCollectionStore>,
    collection: String,
    expected_dimensions: Option<usize>,
}

impl VectorIndexWriter {
    pub fn from_config(config: &VectorIndexConfig) -> Result<Self, VectorStoreError> {
        Ok(Self::new(build_vector_store(config)?, config))
    }

    pub fn new(store: Arc<dyn VectorCollectionStore>, config: &VectorIndexConfig) -> Self {
        Self {
            store,
            collection: config.collection_name.clone(),
            expected_dimensions: config.expected_dimensions,
        }
    }

    /// Insert or replace one record. The collection is ensured (an
    /// idempotent create) before the write; if the write still reports
    /// [`VectorStoreError::CollectionMissing`] — the collection vanished
    /// between the two calls — it is recreated and the write retried
    /// exactly once. Any other error is returned untouched.
    pub async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
        if let Some(expected) = self.expected_dimensions {
            if record.dimensions != expected {
                return Err(VectorStoreError::InvalidArgument(format!(
                    "record '{}' has {} dimensions, expected {}",
                    record.id, record.dimensions, expected
                )));
            }
        }

        self.store.ensure_collection(&self.collection).await?;
        match self.store.upsert(&self.collection, record.clone()).await {
            Ok(()) => Ok(()),
            Err(VectorStoreError::CollectionMissing(_)) => {
                info!(collection = %self.collection, "recreating vector collection lost mid-write");
                self.store.ensure_collection(&self.collection).await?;
                self.store.upsert(&self.collection, record).await
            }
            Err(err) => Err(err),
        }
    }

    /// Index every record in the batch; stops at the first failure.
    pub async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<usize, VectorStoreError> {
        let count = records.len();
        for record in records {
            self.upsert(record).await?;
        }
        debug!(collection = %self.collection, count, "indexed vector records");
        Ok(count)
    }
}

/// Runs similarity queries against the configured collection.
pub struct VectorSearchService {
    store: Arc<dyn VectorCollectionStore>,
    collection: String,
}

impl VectorSearchService {
    pub fn from_config(config: &VectorIndexConfig) -> Result<Self, VectorStoreError> {
        Ok(Self::new(build_vector_store(config)?, config))
    }

    pub fn new(store: Arc<dyn VectorCollectionStore>, config: &VectorIndexConfig) -> Self {
        Self {
            store,
            collection: config.collection_name.clone(),
        }
    }

    /// Exhaustive cosine search: every record in the collection is
    /// scored, ordered by descending similarity, and cut to `top_k`.
    pub async fn search(
        &self,
        query_vec: &[f32],
        top_k: i64,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        if top_k <= 0 {
            return Err(VectorStoreError::InvalidArgument(format!(
                "top_k must be positive, got {}",
                top_k
            )));
        }
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .store
            .query(&self.collection, query_vec, top_k as usize)
            .await?;
        debug!(
            collection = %self.collection,
            requested = top_k,
            returned = results.len(),
            "vector search complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;
    use crate::vector::{InMemoryVectorStore, VectorProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Delegates to an in-memory store while recording the call sequence.
    /// Optionally fails the first upsert with a missing-collection error
    /// to simulate the collection vanishing between ensure and write.
    struct RecordingStore {
        inner: InMemoryVectorStore,
        calls: Mutex<Vec<&'static str>>,
        drop_collection_once: AtomicBool,
    }

    impl RecordingStore {
        fn new(drop_collection_once: bool) -> Self {
            Self {
                inner: InMemoryVectorStore::new(),
                calls: Mutex::new(Vec::new()),
                drop_collection_once: AtomicBool::new(drop_collection_once),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorCollectionStore for RecordingStore {
        async fn ensure_collection(&self, name: &str) -> Result<(), VectorStoreError> {
            self.calls.lock().unwrap().push("ensure");
            self.inner.ensure_collection(name).await
        }

        async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
            self.inner.collection_exists(name).await
        }

        async fn upsert(
            &self,
            collection: &str,
            record: VectorRecord,
        ) -> Result<(), VectorStoreError> {
            self.calls.lock().unwrap().push("upsert");
            if self.drop_collection_once.swap(false, Ordering::SeqCst) {
                return Err(VectorStoreError::CollectionMissing(collection.to_string()));
            }
            self.inner.upsert(collection, record).await
        }

        async fn query(
            &self,
            collection: &str,
            query_vec: &[f32],
            top_k: usize,
        ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
            self.inner.query(collection, query_vec, top_k).await
        }
    }

    fn config(collection: &str) -> VectorIndexConfig {
        VectorIndexConfig {
            provider: VectorProvider::InMemory,
            collection_name: collection.to_string(),
            embedding_service_id: "default".to_string(),
            expected_dimensions: None,
            search_api: None,
            document_db: None,
        }
    }

    fn record(name: &str, embedding: Vec<f32>) -> VectorRecord {
        let table = Table {
            schema: "dbo".to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        VectorRecord::new(table, embedding, "test-model")
    }

    #[tokio::test]
    async fn test_writer_ensures_collection_before_first_write() {
        let store = Arc::new(RecordingStore::new(false));
        let writer = VectorIndexWriter::new(store.clone(), &config("entities"));

        // no provisioning beforehand; ensure happens first and the write
        // lands on the first attempt, with no retry consumed
        writer.upsert(record("Customer", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.calls(), vec!["ensure", "upsert"]);
        assert!(store.collection_exists("entities").await.unwrap());
    }

    #[tokio::test]
    async fn test_writer_retries_once_when_collection_vanishes_mid_write() {
        let store = Arc::new(RecordingStore::new(true));
        let writer = VectorIndexWriter::new(store.clone(), &config("entities"));

        writer.upsert(record("Customer", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.calls(), vec!["ensure", "upsert", "ensure", "upsert"]);
        assert_eq!(store.inner.len("entities"), 1);
    }

    #[tokio::test]
    async fn test_writer_rejects_dimension_mismatch() {
        let store = Arc::new(InMemoryVectorStore::new());
        let mut cfg = config("entities");
        cfg.expected_dimensions = Some(3);
        let writer = VectorIndexWriter::new(store, &cfg);

        let err = writer
            .upsert(record("Customer", vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_search_validates_top_k() {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = VectorSearchService::new(store, &config("entities"));

        let err = service.search(&[1.0], 0).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
        let err = service.search(&[1.0], -3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_search_empty_query_returns_empty() {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = VectorSearchService::new(store, &config("entities"));

        // valid top_k, empty vector: no backend call, no error
        let results = service.search(&[], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_index_and_search() {
        let store = Arc::new(InMemoryVectorStore::new());
        let cfg = config("entities");
        let writer = VectorIndexWriter::new(store.clone(), &cfg);
        let service = VectorSearchService::new(store, &cfg);

        writer
            .upsert_batch(vec![
                record("Customer", vec![1.0, 0.0]),
                record("Orders", vec![0.0, 1.0]),
                record("Invoice", vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let results = service.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, "table_dbo_Customer");
        assert_eq!(results[1].record.id, "table_dbo_Invoice");
    }
}
