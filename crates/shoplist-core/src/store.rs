//! Authoritative list store
//!
//! The `ListStore` exclusively owns the shopping list. Every successful
//! mutation is written through to a [`DurableStore`] before the caller gets
//! the result back; a failed save is logged and otherwise ignored, since the
//! in-memory list stays the source of truth until the next successful save.
//!
//! Saves are synchronous. On the server the store lives inside the single
//! gateway task, so a save holds up that task, and with it every other
//! command, until the snapshot is on disk. That ordering is what guarantees
//! the file never lags behind a list that was already broadcast.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = ListStore::open(JsonFileStore::from_config(&config));
//!
//! let milk = store.add_item("Milk").unwrap();
//! store.toggle_item(milk.id());
//!
//! let items = store.snapshot();
//! ```

use tracing::{error, info, warn};

use crate::models::{is_valid_name, Item};
use crate::storage::DurableStore;

/// The single owner of the shopping list
pub struct ListStore {
    /// Items in insertion order
    items: Vec<Item>,
    /// Where snapshots are written after each change
    persistence: Box<dyn DurableStore>,
}

impl ListStore {
    /// Open the store, restoring the last saved snapshot
    ///
    /// A missing snapshot yields an empty list. A corrupt or unreadable one is
    /// logged and also yields an empty list.
    pub fn open(persistence: impl DurableStore + 'static) -> Self {
        let persistence: Box<dyn DurableStore> = Box::new(persistence);

        let items = match persistence.load() {
            Ok(items) => {
                info!(
                    "Loaded {} items from {}",
                    items.len(),
                    persistence.location()
                );
                items
            }
            Err(e) => {
                warn!("Could not load list, starting empty: {}", e);
                if let Some(hint) = e.recovery_suggestion() {
                    warn!("{}", hint);
                }
                Vec::new()
            }
        };

        Self { items, persistence }
    }

    /// Append a new item
    ///
    /// Returns `None` without touching the list if the name is blank.
    pub fn add_item(&mut self, name: &str) -> Option<Item> {
        if !is_valid_name(name) {
            return None;
        }

        let item = Item::new(name);
        self.items.push(item.clone());
        self.persist();

        info!("Item added: {}", item.name());
        Some(item)
    }

    /// Flip the completed flag of the item with `id`
    ///
    /// Returns the updated item, or `None` if no item matches.
    pub fn toggle_item(&mut self, id: &str) -> Option<Item> {
        let item = self.items.iter_mut().find(|item| item.id() == id)?;
        item.toggle();
        let item = item.clone();
        self.persist();

        info!(
            "Item toggled: {} - {}",
            item.name(),
            if item.completed() {
                "completed"
            } else {
                "pending"
            }
        );
        Some(item)
    }

    /// Remove the item with `id`, keeping the order of the rest
    ///
    /// Returns the removed item, or `None` if no item matches.
    pub fn delete_item(&mut self, id: &str) -> Option<Item> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        let item = self.items.remove(index);
        self.persist();

        info!("Item deleted: {}", item.name());
        Some(item)
    }

    /// Copy of the current list, in insertion order
    pub fn snapshot(&self) -> Vec<Item> {
        self.items.clone()
    }

    /// Look up an item by ID
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Where snapshots are written
    pub fn location(&self) -> String {
        self.persistence.location()
    }

    /// Best-effort save of the whole list
    fn persist(&self) {
        match self.persistence.save(&self.items) {
            Ok(()) => info!("Saved {} items", self.items.len()),
            Err(e) if e.is_recoverable() => {
                warn!("Failed to save list to {}: {}", self.location(), e);
                if let Some(hint) = e.recovery_suggestion() {
                    warn!("{}", hint);
                }
            }
            Err(e) => {
                error!("Failed to save list to {}: {}", self.location(), e);
                if let Some(hint) = e.recovery_suggestion() {
                    error!("{}", hint);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore, StorageError, StorageResult};
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Persistence that always fails to write
    struct FailingStore {
        attempts: Arc<AtomicUsize>,
    }

    impl DurableStore for FailingStore {
        fn load(&self) -> StorageResult<Vec<Item>> {
            Ok(Vec::new())
        }

        fn save(&self, _items: &[Item]) -> StorageResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::from_io(
                io::Error::new(io::ErrorKind::Other, "No space left on device"),
                PathBuf::from("/full"),
            ))
        }

        fn location(&self) -> String {
            "/full".to_string()
        }
    }

    fn memory_store() -> (ListStore, MemoryStore) {
        let backend = MemoryStore::new();
        (ListStore::open(backend.clone()), backend)
    }

    #[test]
    fn test_open_empty() {
        let (store, backend) = memory_store();
        assert!(store.is_empty());
        assert!(backend.blob().is_none());
    }

    #[test]
    fn test_open_corrupt_falls_back_to_empty() {
        let store = ListStore::open(MemoryStore::with_blob("[{]"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_item_appends_and_saves() {
        let (mut store, backend) = memory_store();

        let milk = store.add_item("Milk").unwrap();
        let bread = store.add_item("Bread").unwrap();

        assert_eq!(milk.name(), "Milk");
        assert!(!milk.completed());

        let names: Vec<_> = store.snapshot().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["Milk", "Bread"]);

        let saved = backend.load().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].id(), bread.id());
    }

    #[test]
    fn test_add_blank_name_is_rejected() {
        let (mut store, backend) = memory_store();

        assert!(store.add_item("").is_none());
        assert!(store.add_item("   ").is_none());

        assert!(store.is_empty());
        assert!(backend.blob().is_none(), "rejected add must not save");
    }

    #[test]
    fn test_toggle_item() {
        let (mut store, backend) = memory_store();
        let milk = store.add_item("Milk").unwrap();

        let toggled = store.toggle_item(milk.id()).unwrap();
        assert!(toggled.completed());
        assert_eq!(toggled.id(), milk.id());
        assert_eq!(toggled.created_at(), milk.created_at());
        assert!(backend.load().unwrap()[0].completed());
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let (mut store, _backend) = memory_store();
        let milk = store.add_item("Milk").unwrap();
        let before = store.snapshot();

        store.toggle_item(milk.id());
        store.toggle_item(milk.id());

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_toggle_unknown_is_noop() {
        let (mut store, backend) = memory_store();
        store.add_item("Milk").unwrap();
        let saved_before = backend.blob();

        assert!(store.toggle_item("missing").is_none());
        assert_eq!(backend.blob(), saved_before);
        assert!(!store.snapshot()[0].completed());
    }

    #[test]
    fn test_delete_item_preserves_order() {
        let (mut store, backend) = memory_store();
        store.add_item("Milk").unwrap();
        let bread = store.add_item("Bread").unwrap();
        store.add_item("Eggs").unwrap();

        let removed = store.delete_item(bread.id()).unwrap();
        assert_eq!(removed.name(), "Bread");

        let names: Vec<_> = store.snapshot().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["Milk", "Eggs"]);
        assert_eq!(backend.load().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let (mut store, backend) = memory_store();
        store.add_item("Milk").unwrap();
        let saved_before = backend.blob();

        assert!(store.delete_item("missing").is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(backend.blob(), saved_before);
    }

    #[test]
    fn test_delete_twice_second_is_noop() {
        let (mut store, _backend) = memory_store();
        let milk = store.add_item("Milk").unwrap();

        assert!(store.delete_item(milk.id()).is_some());
        assert!(store.delete_item(milk.id()).is_none());
        assert!(store.get(milk.id()).is_none());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let (mut store, _backend) = memory_store();
        store.add_item("Milk").unwrap();

        let mut copy = store.snapshot();
        copy.clear();

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_count_matches_adds_minus_deletes() {
        let (mut store, _backend) = memory_store();

        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(store.add_item(&format!("item {i}")).unwrap().id().to_string());
        }

        let mut deleted = 0;
        for id in ids.iter().step_by(3) {
            if store.delete_item(id).is_some() {
                deleted += 1;
            }
        }
        // Deleting again must not count
        for id in ids.iter().step_by(3) {
            assert!(store.delete_item(id).is_none());
        }

        assert_eq!(store.len(), 10 - deleted);
    }

    #[test]
    fn test_toggle_parity() {
        let (mut store, _backend) = memory_store();
        let milk = store.add_item("Milk").unwrap();

        for n in 1..=7 {
            let item = store.toggle_item(milk.id()).unwrap();
            assert_eq!(item.completed(), n % 2 == 1);
        }
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut store = ListStore::open(FailingStore {
            attempts: attempts.clone(),
        });

        let milk = store.add_item("Milk").unwrap();
        store.toggle_item(milk.id()).unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 1);
        assert!(store.snapshot()[0].completed());
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shopping-list-data.json");

        let (milk_id, bread_id) = {
            let mut store = ListStore::open(JsonFileStore::new(&path));
            let milk = store.add_item("Milk").unwrap();
            let bread = store.add_item("Bread").unwrap();
            store.toggle_item(bread.id());
            (milk.id().to_string(), bread.id().to_string())
        };

        let store = ListStore::open(JsonFileStore::new(&path));
        let items = store.snapshot();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), milk_id);
        assert_eq!(items[1].id(), bread_id);
        assert!(items[1].completed());
    }
}
