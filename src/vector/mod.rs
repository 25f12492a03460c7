//! Vector indexing and similarity search over semantic-model entities.
//!
//! Each enriched entity is indexed as a [`VectorRecord`]: a copy of the
//! entity, the aggregated text its embedding was produced from, the
//! embedding itself, and staleness metadata. Records are addressed by the
//! deterministic id `{kind}_{schema}_{name}`, so re-indexing an entity
//! replaces its previous record.
//!
//! Staleness has exactly one signal: a record needs regeneration when the
//! entity's `semantic_description_last_update` is newer than the
//! timestamp captured at embedding time. There is no other invalidation
//! path.
//!
//! Search is intentionally exhaustive (brute-force cosine over the whole
//! collection) — no approximate index — which bounds it to small and
//! medium collections by design.

mod infra;
mod search;
mod store;

pub use infra::{
    DocumentDbVectorConfig, SearchApiConfig, VectorIndexConfig, VectorProvider,
};
pub use search::{VectorIndexWriter, VectorSearchService};
pub use store::{build_vector_store, InMemoryVectorStore, ScoredRecord, VectorCollectionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EntityKey, SemanticEntity, StoredProcedure, Table, View};

/// An entity copy embedded in a vector record.
///
/// The canonical entity always lives in the [`SemanticModel`] the
/// repository loaded; this copy exists so search results carry enough
/// context to be useful without a model round-trip.
///
/// [`SemanticModel`]: crate::model::SemanticModel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityEnvelope {
    Table(Table),
    View(View),
    StoredProcedure(StoredProcedure),
}

impl EntityEnvelope {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityEnvelope::Table(t) => t.key(),
            EntityEnvelope::View(v) => v.key(),
            EntityEnvelope::StoredProcedure(p) => p.key(),
        }
    }

    pub fn semantic_description_last_update(&self) -> Option<DateTime<Utc>> {
        match self {
            EntityEnvelope::Table(t) => t.semantic_description_last_update,
            EntityEnvelope::View(v) => v.semantic_description_last_update,
            EntityEnvelope::StoredProcedure(p) => p.semantic_description_last_update,
        }
    }
}

impl From<Table> for EntityEnvelope {
    fn from(t: Table) -> Self {
        EntityEnvelope::Table(t)
    }
}

impl From<View> for EntityEnvelope {
    fn from(v: View) -> Self {
        EntityEnvelope::View(v)
    }
}

impl From<StoredProcedure> for EntityEnvelope {
    fn from(p: StoredProcedure) -> Self {
        EntityEnvelope::StoredProcedure(p)
    }
}

/// An entity's embedding plus the metadata needed to detect staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Deterministic id: `{kind}_{schema}_{name}`.
    pub id: String,
    pub entity: EntityEnvelope,
    /// The aggregated text the embedding was produced from.
    pub searchable_text: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Copy of the entity's `semantic_description_last_update` taken at
    /// embedding time.
    pub semantic_description_version: Option<DateTime<Utc>>,
}

impl VectorRecord {
    /// Build a record for an entity and its freshly computed embedding.
    pub fn new(
        entity: impl Into<EntityEnvelope>,
        embedding: Vec<f32>,
        embedding_model: &str,
    ) -> Self {
        let entity = entity.into();
        let now = Utc::now();
        Self {
            id: entity.key().vector_id(),
            searchable_text: searchable_text(&entity),
            dimensions: embedding.len(),
            embedding,
            embedding_model: embedding_model.to_string(),
            created_at: now,
            last_updated: now,
            semantic_description_version: entity.semantic_description_last_update(),
            entity,
        }
    }

    /// Whether the embedded entity's description has changed since the
    /// embedding was computed. This is the sole staleness signal.
    pub fn needs_regeneration(&self) -> bool {
        match (
            self.entity.semantic_description_last_update(),
            self.semantic_description_version,
        ) {
            (Some(current), Some(version)) => current > version,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Aggregate an entity's identity, descriptions, and structure into the
/// text that gets embedded.
pub fn searchable_text(entity: &EntityEnvelope) -> String {
    let key = entity.key();
    let mut text = format!("{} {}.{}", key.kind.label(), key.schema, key.name);

    match entity {
        EntityEnvelope::Table(table) => {
            push_descriptions(&mut text, &table.description, &table.semantic_description);
            if !table.columns.is_empty() {
                text.push_str("\ncolumns: ");
                let cols: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.type_name))
                    .collect();
                text.push_str(&cols.join(", "));
            }
            if !table.indexes.is_empty() {
                text.push_str("\nindexes: ");
                let idx: Vec<&str> = table.indexes.iter().map(|i| i.name.as_str()).collect();
                text.push_str(&idx.join(", "));
            }
        }
        EntityEnvelope::View(view) => {
            push_descriptions(&mut text, &view.description, &view.semantic_description);
            if !view.columns.is_empty() {
                text.push_str("\ncolumns: ");
                let cols: Vec<String> = view
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.type_name))
                    .collect();
                text.push_str(&cols.join(", "));
            }
            text.push_str("\ndefinition: ");
            text.push_str(excerpt(&view.definition, 2000));
        }
        EntityEnvelope::StoredProcedure(proc) => {
            push_descriptions(&mut text, &proc.description, &proc.semantic_description);
            if let Some(params) = &proc.parameters {
                text.push_str("\nparameters: ");
                text.push_str(params);
            }
            text.push_str("\ndefinition: ");
            text.push_str(excerpt(&proc.definition, 2000));
        }
    }
    text
}

fn push_descriptions(text: &mut String, description: &Option<String>, semantic: &Option<String>) {
    if let Some(desc) = description {
        text.push('\n');
        text.push_str(desc);
    }
    if let Some(desc) = semantic {
        text.push('\n');
        text.push_str(desc);
    }
}

fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
