//! Embedding provider seam.
//!
//! Embedding generation lives behind [`EmbeddingProvider`] so the index
//! writer does not care whether vectors come from a hosted API, a local
//! model, or a test stub. [`embed_entity`] is the bridge into the vector
//! layer: it aggregates an entity's searchable text, embeds it, and
//! returns the ready-to-index [`VectorRecord`].

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::vector::{searchable_text, EntityEnvelope, VectorRecord};

/// A source of embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, stamped into every record this provider feeds.
    fn model_name(&self) -> &str;

    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError>;
}

/// Embed one entity and wrap it into an indexable record.
pub async fn embed_entity(
    provider: &dyn EmbeddingProvider,
    entity: impl Into<EntityEnvelope>,
) -> Result<VectorRecord, VectorStoreError> {
    let entity = entity.into();
    let text = searchable_text(&entity);
    let mut vectors = provider.embed(std::slice::from_ref(&text)).await?;
    let embedding = vectors.pop().ok_or_else(|| {
        VectorStoreError::Backend(format!(
            "provider '{}' returned no vector for input",
            provider.model_name()
        ))
    })?;
    Ok(VectorRecord::new(entity, embedding, provider.model_name()))
}
