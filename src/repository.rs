//! Repository orchestration: cache, lazy proxies, change tracking, and
//! bounded-concurrency persistence behind one load/save contract.
//!
//! # Load path
//!
//! ```text
//! load(path) ──▶ cache hit? ──▶ return
//!                  │ miss
//!                  ▼
//!            read manifest ──▶ build slots (stub or inline)
//!                  │            ├─ attach fetcher (lazy resolution)
//!                  │            └─ attach tracker (change tracking)
//!                  ▼
//!            eager resolve (bounded) unless lazy ──▶ cache fill ──▶ return
//! ```
//!
//! # Failure recovery
//!
//! A missing manifest never surfaces from `load`: the repository answers
//! with a freshly constructed empty model named after the configured
//! database, so first-run scenarios work without scaffolding. Any other
//! load error triggers exactly one direct (non-orchestrated) retry before
//! surfacing. This deliberately trades strict error surfacing for
//! availability — a backend outage can look like an empty project — and
//! is part of the documented contract, not an accident. Save errors are
//! always surfaced.
//!
//! # Concurrency
//!
//! Per-entity reads and writes fan out through a `JoinSet` gated by a
//! fixed-size `Semaphore` (`max_concurrent_operations`); within one save,
//! the manifest is written only after every entity write it references
//! has completed. Cancellation is cooperative: dropping the future leaves
//! already-flushed entities flushed, with no rollback.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ModelCache};
use crate::config::Config;
use crate::error::StoreError;
use crate::lazy::{EntityFetcher, EntitySlot};
use crate::model::{EntityCollection, SemanticEntity, SemanticModel};
use crate::store::{build_store, ManifestEntry, ModelManifest, ModelStore, PersistMode};
use crate::tracking::ChangeTracker;

/// Options controlling one `load` call.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Materialize only identity stubs; bodies load on first access.
    pub lazy_loading: bool,
    /// Attach a change tracker so later saves can be partial.
    pub change_tracking: bool,
    /// Cache the loaded model for this long. `None` disables caching.
    pub caching: Option<Duration>,
    /// Upper bound on concurrent per-entity backend operations.
    pub max_concurrent_operations: usize,
    /// Strategy name to load through. `None` uses the default strategy.
    pub strategy: Option<String>,
    /// Log load/save timings at info level.
    pub monitor_performance: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            lazy_loading: true,
            change_tracking: true,
            caching: Some(Duration::from_secs(300)),
            max_concurrent_operations: 8,
            strategy: None,
            monitor_performance: false,
        }
    }
}

impl LoadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lazy_loading: config.repository.lazy_loading,
            change_tracking: config.repository.change_tracking,
            caching: match config.repository.cache_ttl_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_concurrent_operations: config.repository.max_concurrent_operations,
            strategy: None,
            monitor_performance: false,
        }
    }
}

/// Options controlling one `save` call.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub mode: PersistMode,
    pub max_concurrent_operations: usize,
    pub strategy: Option<String>,
    pub monitor_performance: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            mode: PersistMode::Split,
            max_concurrent_operations: 8,
            strategy: None,
            monitor_performance: false,
        }
    }
}

/// Resolves lazy stubs against the store and path a model was loaded
/// from.
struct StoreFetcher {
    store: Arc<dyn ModelStore>,
    model_path: String,
}

#[async_trait]
impl EntityFetcher for StoreFetcher {
    async fn fetch(&self, relative_path: &str) -> Result<Vec<u8>, StoreError> {
        self.store.read_document(&self.model_path, relative_path).await
    }
}

/// The orchestrator composing persistence strategies, lazy proxies,
/// change tracking, and the model cache.
pub struct ModelRepository {
    strategies: HashMap<String, Arc<dyn ModelStore>>,
    default_strategy: String,
    cache: ModelCache,
    database_name: String,
}

impl ModelRepository {
    /// Create a repository with one registered strategy, which becomes
    /// the default.
    pub fn new(store: Arc<dyn ModelStore>, database_name: &str) -> Self {
        let default_strategy = store.name().to_string();
        let mut strategies = HashMap::new();
        strategies.insert(default_strategy.clone(), store);
        Self {
            strategies,
            default_strategy,
            cache: ModelCache::new(),
            database_name: database_name.to_string(),
        }
    }

    /// Create a repository from configuration, instantiating the selected
    /// backend.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = build_store(config).await?;
        Ok(Self::new(store, &config.storage.database_name))
    }

    /// Register an additional strategy, selectable per call via
    /// [`LoadOptions::strategy`] / [`SaveOptions::strategy`].
    pub fn register_strategy(&mut self, store: Arc<dyn ModelStore>) {
        self.strategies.insert(store.name().to_string(), store);
    }

    fn strategy(&self, name: Option<&str>) -> Result<Arc<dyn ModelStore>, StoreError> {
        let name = name.unwrap_or(&self.default_strategy);
        self.strategies.get(name).cloned().ok_or_else(|| {
            StoreError::Config(format!("no persistence strategy registered as '{}'", name))
        })
    }

    /// Load a model from a logical path.
    ///
    /// Never fails with "not found": absent models come back as an empty
    /// model named after the configured database (see module docs for the
    /// trade-off this encodes).
    pub async fn load(
        &self,
        path: &str,
        options: &LoadOptions,
    ) -> Result<Arc<SemanticModel>, StoreError> {
        let store = self.strategy(options.strategy.as_deref())?;
        let key = CacheKey::new(path, store.name());

        if options.caching.is_some() {
            if let Some(model) = self.cache.get(&key) {
                debug!(path, strategy = store.name(), "model cache hit");
                return Ok(model);
            }
        }

        let started = Instant::now();
        let model = match self.orchestrated_load(&store, path, options).await {
            Ok(model) => model,
            Err(err) if err.is_not_found() => {
                info!(path, "no persisted model found; starting an empty model");
                self.empty_model(options.change_tracking)
            }
            Err(err) => {
                warn!(path, error = %err, "orchestrated load failed; attempting direct load");
                match self.direct_load(&store, path, options).await {
                    Ok(model) => model,
                    Err(retry_err) if retry_err.is_not_found() => {
                        self.empty_model(options.change_tracking)
                    }
                    Err(retry_err) => return Err(retry_err),
                }
            }
        };

        if options.monitor_performance {
            info!(
                path,
                strategy = store.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                tables = model.tables().len(),
                views = model.views().len(),
                stored_procedures = model.stored_procedures().len(),
                "model loaded"
            );
        }

        let model = Arc::new(model);
        if let Some(ttl) = options.caching {
            self.cache.insert(key, Arc::clone(&model), ttl);
        }
        Ok(model)
    }

    /// Persist a model to a logical path.
    ///
    /// With a change tracker attached, split mode writes only dirty
    /// entities (plus the manifest when the reference set changed or the
    /// target has no manifest yet); without one, everything is rewritten.
    /// The cache entry for `(path, strategy)` is evicted before
    /// returning, so the next load observes this write.
    pub async fn save(
        &self,
        model: &SemanticModel,
        path: &str,
        options: &SaveOptions,
    ) -> Result<(), StoreError> {
        let store = self.strategy(options.strategy.as_deref())?;
        let started = Instant::now();

        match options.mode {
            PersistMode::Split => self.save_split(&store, model, path, options).await?,
            PersistMode::SingleFile => self.save_single(&store, model, path, options).await?,
        }

        if let Some(tracker) = model.tracker() {
            tracker.clear();
        }
        self.cache.invalidate(&CacheKey::new(path, store.name()));

        if options.monitor_performance {
            info!(
                path,
                strategy = store.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model saved"
            );
        }
        Ok(())
    }

    /// Evict any cached copy of the model at `path` for the selected
    /// strategy.
    pub fn invalidate_cache(&self, path: &str, strategy: Option<&str>) {
        let name = strategy.unwrap_or(&self.default_strategy).to_string();
        self.cache.invalidate(&CacheKey::new(path, &name));
    }

    fn empty_model(&self, change_tracking: bool) -> SemanticModel {
        let model = SemanticModel::new(&self.database_name, "", None);
        if change_tracking {
            model.attach_tracker(Arc::new(ChangeTracker::new()));
        }
        model
    }

    /// Full orchestrated load: manifest, lazy slots, tracker, eager
    /// resolution when lazy loading is off.
    async fn orchestrated_load(
        &self,
        store: &Arc<dyn ModelStore>,
        path: &str,
        options: &LoadOptions,
    ) -> Result<SemanticModel, StoreError> {
        let manifest = store.read_manifest(path).await?;
        let model = manifest_to_model(manifest);

        let fetcher: Arc<dyn EntityFetcher> = Arc::new(StoreFetcher {
            store: Arc::clone(store),
            model_path: path.to_string(),
        });
        model.attach_fetcher(fetcher);

        if options.change_tracking {
            model.attach_tracker(Arc::new(ChangeTracker::new()));
            model.attach_tracker_to_slots();
        }

        if !options.lazy_loading {
            let semaphore = Arc::new(Semaphore::new(options.max_concurrent_operations.max(1)));
            resolve_all(model.tables().slots(), &semaphore).await?;
            resolve_all(model.views().slots(), &semaphore).await?;
            resolve_all(model.stored_procedures().slots(), &semaphore).await?;
        }

        Ok(model)
    }

    /// Fallback load with no orchestration: plain manifest read plus
    /// sequential entity materialization. Change tracking is still
    /// honored, so a model recovered on this path saves partially like
    /// any other.
    async fn direct_load(
        &self,
        store: &Arc<dyn ModelStore>,
        path: &str,
        options: &LoadOptions,
    ) -> Result<SemanticModel, StoreError> {
        let manifest = store.read_manifest(path).await?;
        let model = manifest_to_model(manifest);
        model.attach_fetcher(Arc::new(StoreFetcher {
            store: Arc::clone(store),
            model_path: path.to_string(),
        }));
        if options.change_tracking {
            model.attach_tracker(Arc::new(ChangeTracker::new()));
            model.attach_tracker_to_slots();
        }

        for slot in model.tables().slots() {
            slot.ensure_resolved().await?;
        }
        for slot in model.views().slots() {
            slot.ensure_resolved().await?;
        }
        for slot in model.stored_procedures().slots() {
            slot.ensure_resolved().await?;
        }
        Ok(model)
    }

    async fn save_split(
        &self,
        store: &Arc<dyn ModelStore>,
        model: &SemanticModel,
        path: &str,
        options: &SaveOptions,
    ) -> Result<(), StoreError> {
        let tracker = model.tracker();
        let partial = tracker.is_some();
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_operations.max(1)));

        let mut writes: JoinSet<Result<(), StoreError>> = JoinSet::new();
        queue_entity_writes(&mut writes, model.tables(), store, path, tracker, &semaphore);
        queue_entity_writes(&mut writes, model.views(), store, path, tracker, &semaphore);
        queue_entity_writes(
            &mut writes,
            model.stored_procedures(),
            store,
            path,
            tracker,
            &semaphore,
        );

        let mut written = 0usize;
        while let Some(result) = writes.join_next().await {
            result.map_err(|e| StoreError::Backend(format!("entity write task failed: {}", e)))??;
            written += 1;
        }
        debug!(path, written, partial, "entity writes complete");

        // Entity documents for removed entities go away with the manifest
        // rewrite that records their removal.
        if let Some(tracker) = tracker {
            for key in tracker.removed_keys() {
                store.delete_document(path, &key.relative_path()).await?;
            }
        }

        let manifest_needed = match tracker {
            None => true,
            Some(tracker) => tracker.is_manifest_dirty() || !store.manifest_exists(path).await?,
        };
        if manifest_needed {
            let manifest = split_manifest(model);
            store.write_manifest(path, &manifest).await?;
        }
        Ok(())
    }

    async fn save_single(
        &self,
        store: &Arc<dyn ModelStore>,
        model: &SemanticModel,
        path: &str,
        options: &SaveOptions,
    ) -> Result<(), StoreError> {
        // Single-file mode inlines every body, so stubs must materialize
        // first.
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_operations.max(1)));
        resolve_all(model.tables().slots(), &semaphore).await?;
        resolve_all(model.views().slots(), &semaphore).await?;
        resolve_all(model.stored_procedures().slots(), &semaphore).await?;

        let manifest = single_file_manifest(model).await?;
        store.write_manifest(path, &manifest).await
    }
}

/// Resolve every slot in a collection, bounded by the semaphore.
async fn resolve_all<T: SemanticEntity + 'static>(
    slots: Vec<Arc<EntitySlot<T>>>,
    semaphore: &Arc<Semaphore>,
) -> Result<(), StoreError> {
    let mut join: JoinSet<Result<(), StoreError>> = JoinSet::new();
    for slot in slots {
        let semaphore = Arc::clone(semaphore);
        join.spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| StoreError::Backend("concurrency gate closed".to_string()))?;
            slot.ensure_resolved().await
        });
    }
    while let Some(result) = join.join_next().await {
        result.map_err(|e| StoreError::Backend(format!("entity load task failed: {}", e)))??;
    }
    Ok(())
}

/// Queue split-mode write tasks for one collection.
///
/// With a tracker, only dirty slots are written (a dirty slot is always
/// resolved, since mutation resolves first). Without one, every slot is
/// written; stubs materialize through their fetcher first, so a save to a
/// path other than the load source still produces a complete document
/// set under the manifest it writes.
fn queue_entity_writes<T: SemanticEntity + 'static>(
    writes: &mut JoinSet<Result<(), StoreError>>,
    collection: &EntityCollection<T>,
    store: &Arc<dyn ModelStore>,
    path: &str,
    tracker: Option<&Arc<ChangeTracker>>,
    semaphore: &Arc<Semaphore>,
) {
    for slot in collection.slots() {
        if let Some(tracker) = tracker {
            if !tracker.is_dirty(&slot.key()) {
                continue;
            }
        }
        let store = Arc::clone(store);
        let path = path.to_string();
        let semaphore = Arc::clone(semaphore);
        writes.spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| StoreError::Backend("concurrency gate closed".to_string()))?;
            slot.ensure_resolved().await?;
            let body = slot.snapshot().await?;
            let bytes = serde_json::to_vec_pretty(&body)?;
            store
                .write_document(&path, &slot.relative_path(), &bytes)
                .await
        });
    }
}

fn manifest_to_model(manifest: ModelManifest) -> SemanticModel {
    let model = SemanticModel::new(
        &manifest.name,
        &manifest.source,
        manifest.description.clone(),
    );
    fill_collection(model.tables(), manifest.tables);
    fill_collection(model.views(), manifest.views);
    fill_collection(model.stored_procedures(), manifest.stored_procedures);
    model
}

fn fill_collection<T: SemanticEntity>(
    collection: &EntityCollection<T>,
    entries: Vec<ManifestEntry<T>>,
) {
    for entry in entries {
        let slot = match entry.entity {
            Some(entity) => EntitySlot::resolved(entity),
            None => {
                let path = entry
                    .path
                    .unwrap_or_else(|| {
                        crate::model::EntityKey::new(T::KIND, &entry.schema, &entry.name)
                            .relative_path()
                    });
                EntitySlot::stub(&entry.schema, &entry.name, &path)
            }
        };
        collection.push_slot(Arc::new(slot));
    }
}

fn split_manifest(model: &SemanticModel) -> ModelManifest {
    ModelManifest {
        name: model.name.clone(),
        source: model.source.clone(),
        description: model.description.clone(),
        tables: split_entries(model.tables()),
        views: split_entries(model.views()),
        stored_procedures: split_entries(model.stored_procedures()),
    }
}

fn split_entries<T: SemanticEntity>(collection: &EntityCollection<T>) -> Vec<ManifestEntry<T>> {
    collection
        .slots()
        .iter()
        .map(|slot| ManifestEntry {
            schema: slot.schema().to_string(),
            name: slot.name().to_string(),
            path: Some(slot.relative_path()),
            entity: None,
        })
        .collect()
}

async fn single_file_manifest(model: &SemanticModel) -> Result<ModelManifest, StoreError> {
    Ok(ModelManifest {
        name: model.name.clone(),
        source: model.source.clone(),
        description: model.description.clone(),
        tables: inline_entries(model.tables()).await?,
        views: inline_entries(model.views()).await?,
        stored_procedures: inline_entries(model.stored_procedures()).await?,
    })
}

async fn inline_entries<T: SemanticEntity>(
    collection: &EntityCollection<T>,
) -> Result<Vec<ManifestEntry<T>>, StoreError> {
    let mut entries = Vec::new();
    for slot in collection.slots() {
        entries.push(ManifestEntry {
            schema: slot.schema().to_string(),
            name: slot.name().to_string(),
            path: None,
            entity: Some(slot.snapshot().await?),
        });
    }
    Ok(entries)
}
