//! Keyed storage for GPU resources
//!
//! Scene objects refer to uploaded meshes by a generational key instead of
//! holding the buffers themselves, so removing a mesh can never leave a
//! dangling handle behind: a stale key simply stops resolving.

use slotmap::{Key, SlotMap};

slotmap::new_key_type! {
    /// Key of an uploaded mesh
    pub struct MeshKey;
}

/// Generational table of resources addressed by `K`
pub struct ResourceTable<K: Key, T> {
    slots: SlotMap<K, T>,
}

impl<K: Key, T> ResourceTable<K, T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self { slots: SlotMap::with_key() }
    }

    /// Store a resource and return its key
    pub fn insert(&mut self, resource: T) -> K {
        self.slots.insert(resource)
    }

    /// Resource for `key`, if it is still alive
    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key)
    }

    /// Remove and return the resource for `key`
    pub fn remove(&mut self, key: K) -> Option<T> {
        self.slots.remove(key)
    }

    /// Whether `key` still resolves
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every resource
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Iterate over live resources
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter()
    }
}

impl<K: Key, T> Default for ResourceTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table: ResourceTable<MeshKey, &str> = ResourceTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_removed_key_is_stale() {
        let mut table: ResourceTable<MeshKey, u32> = ResourceTable::new();
        let key = table.insert(7);
        assert_eq!(table.remove(key), Some(7));
        assert!(!table.contains(key));
        assert_eq!(table.get(key), None);

        // A reused slot does not revive the old key
        let newer = table.insert(8);
        assert_ne!(key, newer);
        assert_eq!(table.get(key), None);
    }

    #[test]
    fn test_clear_empties_table() {
        let mut table: ResourceTable<MeshKey, u32> = ResourceTable::default();
        let key = table.insert(1);
        table.insert(2);
        table.clear();
        assert!(table.is_empty());
        assert!(!table.contains(key));
        assert_eq!(table.iter().count(), 0);
    }
}
