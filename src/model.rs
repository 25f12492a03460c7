//! Core data model: the semantic model of a relational database schema.
//!
//! A [`SemanticModel`] aggregates three entity collections — tables, views,
//! and stored procedures — extracted from a database and enriched with
//! generated natural-language descriptions. Within each collection the
//! `(schema, name)` pair is unique and serves as the addressable key for
//! cache entries, split-mode file names, and vector record ids.
//!
//! Entity bodies are plain serde structs; the collection slots that give
//! them lazy-loading and change-tracking behavior live in [`crate::lazy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::lazy::{EntityFetcher, EntitySlot};
use crate::tracking::ChangeTracker;

/// The kind of a schema entity. Determines the split-mode subdirectory
/// and the vector id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Table,
    View,
    StoredProcedure,
}

impl EntityKind {
    /// Subdirectory name used in split-mode layouts (`tables/`, `views/`,
    /// `storedprocedures/`).
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityKind::Table => "tables",
            EntityKind::View => "views",
            EntityKind::StoredProcedure => "storedprocedures",
        }
    }

    /// Label used as the vector id prefix (`table_dbo_Customer`).
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Table => "table",
            EntityKind::View => "view",
            EntityKind::StoredProcedure => "storedprocedure",
        }
    }
}

/// Addressable identity of an entity: kind + schema + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub schema: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, schema: &str, name: &str) -> Self {
        Self {
            kind,
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    /// Deterministic vector record id: `{kind}_{schema}_{name}`.
    pub fn vector_id(&self) -> String {
        format!("{}_{}_{}", self.kind.label(), self.schema, self.name)
    }

    /// Relative path of the entity document in split-mode layouts:
    /// `{dir}/{Schema}.{Name}.json`.
    pub fn relative_path(&self) -> String {
        format!("{}/{}.{}.json", self.kind.dir_name(), self.schema, self.name)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}].[{}]", self.kind.label(), self.schema, self.name)
    }
}

/// A column of a table or view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub is_computed: bool,
    #[serde(default)]
    pub max_length: Option<i32>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub scale: Option<u8>,
    /// Table referenced by a foreign key on this column, if any.
    #[serde(default)]
    pub referenced_table: Option<String>,
    #[serde(default)]
    pub referenced_column: Option<String>,
}

/// Membership of one column in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    #[serde(default)]
    pub is_descending: bool,
    #[serde(default)]
    pub is_included: bool,
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: String,
    #[serde(default)]
    pub columns: Vec<IndexColumn>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

/// A database table with its columns and indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    /// Structural description captured at extraction time.
    #[serde(default)]
    pub description: Option<String>,
    /// Generated natural-language description. Set only through
    /// [`Table::set_semantic_description`].
    #[serde(default)]
    pub semantic_description: Option<String>,
    #[serde(default)]
    pub semantic_description_last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ignored: bool,
    #[serde(default)]
    pub ignore_reason: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<TableIndex>,
}

/// A database view with its definition text and columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub semantic_description: Option<String>,
    #[serde(default)]
    pub semantic_description_last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ignored: bool,
    #[serde(default)]
    pub ignore_reason: Option<String>,
    /// View source text.
    pub definition: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// A stored procedure with its definition and raw parameter list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredProcedure {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub semantic_description: Option<String>,
    #[serde(default)]
    pub semantic_description_last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ignored: bool,
    #[serde(default)]
    pub ignore_reason: Option<String>,
    pub definition: String,
    /// Raw parameter list text as extracted.
    #[serde(default)]
    pub parameters: Option<String>,
}

/// Common behavior shared by table, view, and stored-procedure entities.
pub trait SemanticEntity: Clone + Send + Sync + serde::de::DeserializeOwned + Serialize {
    const KIND: EntityKind;

    fn schema(&self) -> &str;
    fn name(&self) -> &str;
    fn semantic_description(&self) -> Option<&str>;
    fn semantic_description_last_update(&self) -> Option<DateTime<Utc>>;
    fn is_ignored(&self) -> bool;

    /// Sanctioned mutation entry point for generated descriptions.
    /// Stamps `semantic_description_last_update` with the current time.
    fn set_semantic_description(&mut self, text: &str);

    /// Mark the entity excluded from enrichment and search without
    /// removing it from the model.
    fn set_ignored(&mut self, reason: Option<String>);

    fn key(&self) -> EntityKey {
        EntityKey::new(Self::KIND, self.schema(), self.name())
    }
}

macro_rules! impl_semantic_entity {
    ($ty:ty, $kind:expr) => {
        impl SemanticEntity for $ty {
            const KIND: EntityKind = $kind;

            fn schema(&self) -> &str {
                &self.schema
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn semantic_description(&self) -> Option<&str> {
                self.semantic_description.as_deref()
            }

            fn semantic_description_last_update(&self) -> Option<DateTime<Utc>> {
                self.semantic_description_last_update
            }

            fn is_ignored(&self) -> bool {
                self.is_ignored
            }

            fn set_semantic_description(&mut self, text: &str) {
                self.semantic_description = Some(text.to_string());
                self.semantic_description_last_update = Some(Utc::now());
            }

            fn set_ignored(&mut self, reason: Option<String>) {
                self.is_ignored = true;
                self.ignore_reason = reason;
            }
        }
    };
}

impl_semantic_entity!(Table, EntityKind::Table);
impl_semantic_entity!(View, EntityKind::View);
impl_semantic_entity!(StoredProcedure, EntityKind::StoredProcedure);

/// One entity collection within a model.
///
/// Holds [`EntitySlot`]s behind a `RwLock` so entities can be added or
/// removed on a shared model. `(schema, name)` is unique within a
/// collection. Growing or shrinking the collection marks the manifest
/// dirty on an attached [`ChangeTracker`], regardless of tracking mode
/// for entity bodies.
pub struct EntityCollection<T: SemanticEntity> {
    slots: RwLock<Vec<Arc<EntitySlot<T>>>>,
}

impl<T: SemanticEntity> EntityCollection<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// All slots, in insertion order.
    pub fn slots(&self) -> Vec<Arc<EntitySlot<T>>> {
        self.slots.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().unwrap().is_empty()
    }

    /// Find a slot by `(schema, name)`.
    pub fn find(&self, schema: &str, name: &str) -> Option<Arc<EntitySlot<T>>> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .find(|s| s.schema() == schema && s.name() == name)
            .cloned()
    }

    pub(crate) fn push_slot(&self, slot: Arc<EntitySlot<T>>) {
        self.slots.write().unwrap().push(slot);
    }

    /// Insert a slot, replacing any existing slot with the same
    /// `(schema, name)`. Returns whether a replacement happened.
    pub(crate) fn upsert_slot(&self, slot: Arc<EntitySlot<T>>) -> bool {
        let mut slots = self.slots.write().unwrap();
        match slots
            .iter()
            .position(|s| s.schema() == slot.schema() && s.name() == slot.name())
        {
            Some(pos) => {
                slots[pos] = slot;
                true
            }
            None => {
                slots.push(slot);
                false
            }
        }
    }

    pub(crate) fn remove_slot(&self, schema: &str, name: &str) -> Option<Arc<EntitySlot<T>>> {
        let mut slots = self.slots.write().unwrap();
        let pos = slots
            .iter()
            .position(|s| s.schema() == schema && s.name() == name)?;
        Some(slots.remove(pos))
    }
}

impl<T: SemanticEntity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The aggregate root: a database schema plus enrichment metadata.
///
/// Exclusively owns its entities, columns, and indexes (a tree, no
/// cycles). Vector records copy entities for indexing; the canonical copy
/// always lives here.
pub struct SemanticModel {
    pub name: String,
    /// Connection descriptor the schema was extracted from.
    pub source: String,
    pub description: Option<String>,
    tables: EntityCollection<Table>,
    views: EntityCollection<View>,
    stored_procedures: EntityCollection<StoredProcedure>,
    tracker: OnceLock<Arc<ChangeTracker>>,
}

impl SemanticModel {
    pub fn new(name: &str, source: &str, description: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            description,
            tables: EntityCollection::new(),
            views: EntityCollection::new(),
            stored_procedures: EntityCollection::new(),
            tracker: OnceLock::new(),
        }
    }

    pub fn tables(&self) -> &EntityCollection<Table> {
        &self.tables
    }

    pub fn views(&self) -> &EntityCollection<View> {
        &self.views
    }

    pub fn stored_procedures(&self) -> &EntityCollection<StoredProcedure> {
        &self.stored_procedures
    }

    /// Attach a change tracker. Later attachments are ignored; the first
    /// one wins for the lifetime of this model instance.
    pub fn attach_tracker(&self, tracker: Arc<ChangeTracker>) {
        let _ = self.tracker.set(tracker);
    }

    pub fn tracker(&self) -> Option<&Arc<ChangeTracker>> {
        self.tracker.get()
    }

    /// Add a resolved table. `(schema, name)` is unique per collection:
    /// adding an entity whose key already exists replaces the existing
    /// one. Marks the manifest dirty when the reference set grows.
    pub fn add_table(&self, table: Table) {
        self.add_entity(&self.tables, table);
    }

    pub fn add_view(&self, view: View) {
        self.add_entity(&self.views, view);
    }

    pub fn add_stored_procedure(&self, proc: StoredProcedure) {
        self.add_entity(&self.stored_procedures, proc);
    }

    fn add_entity<T: SemanticEntity + 'static>(&self, collection: &EntityCollection<T>, entity: T) {
        let slot = Arc::new(EntitySlot::resolved(entity));
        if let Some(tracker) = self.tracker.get() {
            slot.attach_tracker(Arc::clone(tracker));
            tracker.mark_dirty(slot.key());
        }
        let replaced = collection.upsert_slot(slot);
        if !replaced {
            // replacement keeps the same manifest entry; only a new key
            // changes the reference set
            if let Some(tracker) = self.tracker.get() {
                tracker.mark_manifest_dirty();
            }
        }
    }

    /// Remove a table by `(schema, name)`. Marks the manifest dirty and
    /// remembers the removal so the next save can delete the entity file.
    pub fn remove_table(&self, schema: &str, name: &str) -> bool {
        self.remove_entity(&self.tables, schema, name)
    }

    pub fn remove_view(&self, schema: &str, name: &str) -> bool {
        self.remove_entity(&self.views, schema, name)
    }

    pub fn remove_stored_procedure(&self, schema: &str, name: &str) -> bool {
        self.remove_entity(&self.stored_procedures, schema, name)
    }

    fn remove_entity<T: SemanticEntity>(
        &self,
        collection: &EntityCollection<T>,
        schema: &str,
        name: &str,
    ) -> bool {
        match collection.remove_slot(schema, name) {
            Some(slot) => {
                if let Some(tracker) = self.tracker.get() {
                    tracker.mark_manifest_dirty();
                    tracker.mark_removed(slot.key());
                }
                true
            }
            None => false,
        }
    }

    /// Keys of every entity across all three collections.
    pub fn entity_keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = Vec::new();
        keys.extend(self.tables.slots().iter().map(|s| s.key()));
        keys.extend(self.views.slots().iter().map(|s| s.key()));
        keys.extend(self.stored_procedures.slots().iter().map(|s| s.key()));
        keys
    }

    /// Attach a fetcher to every slot so stubs can resolve themselves.
    pub(crate) fn attach_fetcher(&self, fetcher: Arc<dyn EntityFetcher>) {
        for slot in self.tables.slots() {
            slot.attach_fetcher(Arc::clone(&fetcher));
        }
        for slot in self.views.slots() {
            slot.attach_fetcher(Arc::clone(&fetcher));
        }
        for slot in self.stored_procedures.slots() {
            slot.attach_fetcher(Arc::clone(&fetcher));
        }
    }

    /// Propagate an attached tracker to every slot.
    pub(crate) fn attach_tracker_to_slots(&self) {
        let Some(tracker) = self.tracker.get() else {
            return;
        };
        for slot in self.tables.slots() {
            slot.attach_tracker(Arc::clone(tracker));
        }
        for slot in self.views.slots() {
            slot.attach_tracker(Arc::clone(tracker));
        }
        for slot in self.stored_procedures.slots() {
            slot.attach_tracker(Arc::clone(tracker));
        }
    }
}

impl fmt::Debug for SemanticModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticModel")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("tables", &self.tables.len())
            .field("views", &self.views.len())
            .field("stored_procedures", &self.stored_procedures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(schema: &str, name: &str) -> Table {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
            description: None,
            semantic_description: None,
            semantic_description_last_update: None,
            is_ignored: false,
            ignore_reason: None,
            columns: vec![Column {
                name: "Id".to_string(),
                type_name: "int".to_string(),
                is_primary_key: true,
                is_identity: true,
                ..Default::default()
            }],
            indexes: Vec::new(),
        }
    }

    #[test]
    fn test_vector_id_is_deterministic() {
        let key = EntityKey::new(EntityKind::Table, "dbo", "Customer");
        assert_eq!(key.vector_id(), "table_dbo_Customer");
        assert_eq!(key.relative_path(), "tables/dbo.Customer.json");
    }

    #[test]
    fn test_set_semantic_description_stamps_timestamp() {
        let mut table = sample_table("dbo", "Customer");
        assert!(table.semantic_description_last_update.is_none());
        table.set_semantic_description("Stores customer master data");
        assert_eq!(
            table.semantic_description.as_deref(),
            Some("Stores customer master data")
        );
        assert!(table.semantic_description_last_update.is_some());
    }

    #[test]
    fn test_add_and_find() {
        let model = SemanticModel::new("shop", "server=.;db=shop", None);
        model.add_table(sample_table("dbo", "Customer"));
        model.add_table(sample_table("sales", "Order"));

        assert_eq!(model.tables().len(), 2);
        assert!(model.tables().find("dbo", "Customer").is_some());
        assert!(model.tables().find("dbo", "Order").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_add_replaces_existing_entity() {
        let model = SemanticModel::new("shop", "src", None);
        model.add_table(sample_table("dbo", "Customer"));

        let mut updated = sample_table("dbo", "Customer");
        updated.description = Some("second version".to_string());
        model.add_table(updated);

        assert_eq!(model.tables().len(), 1);
        let slot = model.tables().find("dbo", "Customer").unwrap();
        let body = slot.snapshot().await.unwrap();
        assert_eq!(body.description.as_deref(), Some("second version"));
    }

    #[test]
    fn test_replacement_does_not_mark_manifest_dirty() {
        let model = SemanticModel::new("shop", "src", None);
        let tracker = Arc::new(crate::tracking::ChangeTracker::new());
        model.attach_tracker(Arc::clone(&tracker));

        model.add_table(sample_table("dbo", "Customer"));
        tracker.clear();

        // same key: the reference set is unchanged, but the body is dirty
        model.add_table(sample_table("dbo", "Customer"));
        assert!(!tracker.is_manifest_dirty());
        assert!(tracker.is_dirty(&EntityKey::new(EntityKind::Table, "dbo", "Customer")));
    }

    #[test]
    fn test_remove_marks_manifest_dirty() {
        let model = SemanticModel::new("shop", "src", None);
        let tracker = Arc::new(crate::tracking::ChangeTracker::new());
        model.attach_tracker(Arc::clone(&tracker));

        model.add_table(sample_table("dbo", "Customer"));
        tracker.clear();
        assert!(!tracker.is_manifest_dirty());

        assert!(model.remove_table("dbo", "Customer"));
        assert!(tracker.is_manifest_dirty());
        assert_eq!(tracker.removed_keys().len(), 1);
        assert!(!model.remove_table("dbo", "Customer"));
    }

    #[test]
    fn test_entity_keys_cover_all_collections() {
        let model = SemanticModel::new("shop", "src", None);
        model.add_table(sample_table("dbo", "Customer"));
        model.add_view(View {
            schema: "dbo".to_string(),
            name: "ActiveCustomers".to_string(),
            description: None,
            semantic_description: None,
            semantic_description_last_update: None,
            is_ignored: false,
            ignore_reason: None,
            definition: "SELECT * FROM dbo.Customer WHERE IsActive = 1".to_string(),
            columns: Vec::new(),
        });

        let keys = model.entity_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|k| k.kind == EntityKind::View));
    }
}
