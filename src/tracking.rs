//! Change tracking for partial saves.
//!
//! Tracks entity identities, not object graphs: a dirty set of
//! [`EntityKey`]s plus a manifest-dirty flag. Tracked setters (description
//! updates, column mutations through [`EntitySlot::update`]) mark their
//! key dirty; adding or removing an entity marks the manifest dirty
//! regardless of tracking mode for entity bodies.
//!
//! [`EntitySlot::update`]: crate::lazy::EntitySlot::update

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::model::EntityKey;

/// Records which loaded entities have been mutated since load.
pub struct ChangeTracker {
    dirty: Mutex<HashSet<EntityKey>>,
    removed: Mutex<HashSet<EntityKey>>,
    manifest_dirty: AtomicBool,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            dirty: Mutex::new(HashSet::new()),
            removed: Mutex::new(HashSet::new()),
            manifest_dirty: AtomicBool::new(false),
        }
    }

    pub fn mark_dirty(&self, key: EntityKey) {
        self.dirty.lock().unwrap().insert(key);
    }

    /// Record an entity removed from its collection. The next save deletes
    /// the entity's document and rewrites the manifest.
    pub fn mark_removed(&self, key: EntityKey) {
        self.dirty.lock().unwrap().remove(&key);
        self.removed.lock().unwrap().insert(key);
        self.mark_manifest_dirty();
    }

    pub fn mark_manifest_dirty(&self) {
        self.manifest_dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self, key: &EntityKey) -> bool {
        self.dirty.lock().unwrap().contains(key)
    }

    pub fn is_manifest_dirty(&self) -> bool {
        self.manifest_dirty.load(Ordering::SeqCst)
    }

    pub fn dirty_keys(&self) -> Vec<EntityKey> {
        self.dirty.lock().unwrap().iter().cloned().collect()
    }

    pub fn removed_keys(&self) -> Vec<EntityKey> {
        self.removed.lock().unwrap().iter().cloned().collect()
    }

    pub fn has_changes(&self) -> bool {
        self.is_manifest_dirty() || !self.dirty.lock().unwrap().is_empty()
    }

    /// Reset after a successful save.
    pub fn clear(&self) {
        self.dirty.lock().unwrap().clear();
        self.removed.lock().unwrap().clear();
        self.manifest_dirty.store(false, Ordering::SeqCst);
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    fn key(name: &str) -> EntityKey {
        EntityKey::new(EntityKind::Table, "dbo", name)
    }

    #[test]
    fn test_dirty_set_tracks_identities() {
        let tracker = ChangeTracker::new();
        assert!(!tracker.has_changes());

        tracker.mark_dirty(key("Customer"));
        tracker.mark_dirty(key("Customer"));
        tracker.mark_dirty(key("Order"));

        assert!(tracker.is_dirty(&key("Customer")));
        assert!(!tracker.is_dirty(&key("Invoice")));
        assert_eq!(tracker.dirty_keys().len(), 2);
    }

    #[test]
    fn test_removal_drops_dirty_entry() {
        let tracker = ChangeTracker::new();
        tracker.mark_dirty(key("Customer"));
        tracker.mark_removed(key("Customer"));

        assert!(!tracker.is_dirty(&key("Customer")));
        assert_eq!(tracker.removed_keys(), vec![key("Customer")]);
        assert!(tracker.is_manifest_dirty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let tracker = ChangeTracker::new();
        tracker.mark_dirty(key("Customer"));
        tracker.mark_manifest_dirty();
        tracker.clear();

        assert!(!tracker.has_changes());
        assert!(tracker.removed_keys().is_empty());
    }
}
