//! Lazy entity slots with single-flight stub resolution.
//!
//! When a model is loaded lazily, each collection member starts as a stub
//! carrying only its identity and the relative path of its body document.
//! The first body access fetches the document through the attached
//! [`EntityFetcher`] and replaces the stub in place; subsequent reads are
//! free and return the same materialized value.
//!
//! Resolution is coordinated per slot: the fetch happens under the slot's
//! write lock, so concurrent first-touches block on the lock and the
//! late arrivals observe the resolved state without issuing a second
//! fetch.

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::StoreError;
use crate::model::{EntityKey, SemanticEntity};
use crate::tracking::ChangeTracker;

/// Fetches one entity document's raw bytes by relative path.
///
/// Implemented by the repository over the persistence strategy a model was
/// loaded from, so stubs resolve against the same backend and logical
/// path.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch(&self, relative_path: &str) -> Result<Vec<u8>, StoreError>;
}

enum SlotState<T> {
    Stub { relative_path: String },
    Resolved(T),
}

/// One member of an entity collection: either a stub awaiting
/// materialization or a fully resolved entity body.
pub struct EntitySlot<T: SemanticEntity> {
    schema: String,
    name: String,
    state: RwLock<SlotState<T>>,
    fetcher: OnceLock<Arc<dyn EntityFetcher>>,
    tracker: OnceLock<Arc<ChangeTracker>>,
}

impl<T: SemanticEntity> EntitySlot<T> {
    /// A slot that already holds its full body.
    pub fn resolved(entity: T) -> Self {
        Self {
            schema: entity.schema().to_string(),
            name: entity.name().to_string(),
            state: RwLock::new(SlotState::Resolved(entity)),
            fetcher: OnceLock::new(),
            tracker: OnceLock::new(),
        }
    }

    /// A stub holding only identity and document location.
    pub fn stub(schema: &str, name: &str, relative_path: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            state: RwLock::new(SlotState::Stub {
                relative_path: relative_path.to_string(),
            }),
            fetcher: OnceLock::new(),
            tracker: OnceLock::new(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(T::KIND, &self.schema, &self.name)
    }

    /// Relative path of this entity's document in split-mode layouts.
    pub fn relative_path(&self) -> String {
        self.key().relative_path()
    }

    pub(crate) fn attach_fetcher(&self, fetcher: Arc<dyn EntityFetcher>) {
        let _ = self.fetcher.set(fetcher);
    }

    pub(crate) fn attach_tracker(&self, tracker: Arc<ChangeTracker>) {
        let _ = self.tracker.set(tracker);
    }

    /// Whether the body has been materialized.
    pub async fn is_resolved(&self) -> bool {
        matches!(&*self.state.read().await, SlotState::Resolved(_))
    }

    /// Read access to the entity body, resolving the stub on first touch.
    pub async fn read(&self) -> Result<RwLockReadGuard<'_, T>, StoreError> {
        self.resolve().await?;
        let guard = self.state.read().await;
        Ok(RwLockReadGuard::map(guard, |state| match state {
            SlotState::Resolved(entity) => entity,
            // resolve() replaced the stub before we re-acquired the lock
            SlotState::Stub { .. } => unreachable!("slot read after successful resolution"),
        }))
    }

    /// Clone the entity body, resolving the stub on first touch.
    pub async fn snapshot(&self) -> Result<T, StoreError> {
        Ok(self.read().await?.clone())
    }

    /// Mutate the entity body, resolving first if needed. Marks the
    /// entity dirty on an attached change tracker.
    pub async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut T),
    {
        self.resolve().await?;
        {
            let mut guard = self.state.write().await;
            match &mut *guard {
                SlotState::Resolved(entity) => f(entity),
                SlotState::Stub { .. } => unreachable!("slot update after successful resolution"),
            }
        }
        if let Some(tracker) = self.tracker.get() {
            tracker.mark_dirty(self.key());
        }
        Ok(())
    }

    /// Materialize the body without reading it (eager loading, manifest
    /// inlining).
    pub async fn ensure_resolved(&self) -> Result<(), StoreError> {
        self.resolve().await
    }

    /// Set the generated description through the sanctioned entry point.
    pub async fn set_semantic_description(&self, text: &str) -> Result<(), StoreError> {
        self.update(|entity| entity.set_semantic_description(text))
            .await
    }

    /// Materialize the body if this slot is still a stub.
    ///
    /// Holds the write lock across the fetch, which is what makes
    /// concurrent first-access single-flighted: every other caller parks
    /// on the lock and finds the resolved state afterwards.
    async fn resolve(&self) -> Result<(), StoreError> {
        {
            let guard = self.state.read().await;
            if matches!(&*guard, SlotState::Resolved(_)) {
                return Ok(());
            }
        }

        let mut guard = self.state.write().await;
        let relative_path = match &*guard {
            SlotState::Resolved(_) => return Ok(()),
            SlotState::Stub { relative_path } => relative_path.clone(),
        };

        let fetcher = self.fetcher.get().ok_or_else(|| {
            StoreError::Backend(format!(
                "cannot resolve stub {}: no fetcher attached",
                self.key()
            ))
        })?;

        tracing::debug!(entity = %self.key(), path = %relative_path, "resolving lazy stub");
        let bytes = fetcher.fetch(&relative_path).await?;
        let entity: T = serde_json::from_slice(&bytes)?;
        *guard = SlotState::Resolved(entity);
        Ok(())
    }
}
