//! Derived, non-persisted state kept beside the datablocks instead of in
//! them, like the `*_Runtime` structs do in the stored records.

use super::{id::SessionUid, registry::Registry};
use log::trace;
use std::collections::HashMap;

/// A typed side table keyed by session uid. Entries are caches: they can be
/// dropped at any time and rebuilt from the datablock.
#[derive(Debug)]
pub struct RuntimeStore<T> {
    entries: HashMap<SessionUid, T>,
}

impl<T> Default for RuntimeStore<T> {
    fn default() -> Self {
        RuntimeStore {
            entries: HashMap::new(),
        }
    }
}

impl<T> RuntimeStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: SessionUid) -> Option<&T> {
        self.entries.get(&uid)
    }

    pub fn get_mut(&mut self, uid: SessionUid) -> Option<&mut T> {
        self.entries.get_mut(&uid)
    }

    /// Returns the cached value, computing it first if there is none.
    pub fn get_or_insert_with<F: FnOnce() -> T>(&mut self, uid: SessionUid, f: F) -> &mut T {
        self.entries.entry(uid).or_insert_with(|| {
            trace!("computing runtime data for {}", uid);
            f()
        })
    }

    pub fn insert(&mut self, uid: SessionUid, value: T) -> Option<T> {
        self.entries.insert(uid, value)
    }

    /// Drops the cached value so the next access recomputes it.
    pub fn invalidate(&mut self, uid: SessionUid) -> Option<T> {
        let old = self.entries.remove(&uid);
        if old.is_some() {
            trace!("invalidated runtime data for {}", uid);
        }
        old
    }

    /// Drops entries whose datablock is gone. Returns how many were dropped.
    pub fn retain_live(&mut self, registry: &Registry) -> usize {
        let before = self.entries.len();
        self.entries.retain(|uid, _| registry.contains(*uid));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{mesh::Mesh, registry::Datablock};
    use std::cell::Cell;

    #[test]
    fn computes_once() {
        let uid = SessionUid::new(1).unwrap();
        let calls = Cell::new(0);
        let mut store = RuntimeStore::new();
        for _ in 0..3 {
            let value = store.get_or_insert_with(uid, || {
                calls.set(calls.get() + 1);
                42
            });
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.get(), 1);

        assert_eq!(store.invalidate(uid), Some(42));
        assert_eq!(store.invalidate(uid), None);
        store.get_or_insert_with(uid, || 7);
        assert_eq!(store.get(uid), Some(&7));
    }

    #[test]
    fn dead_entries_are_dropped() {
        let mut registry = Registry::new();
        let kept = registry.add("Kept", Datablock::Mesh(Mesh::new())).unwrap();
        let gone = registry.add("Gone", Datablock::Mesh(Mesh::new())).unwrap();

        let mut bounds: RuntimeStore<[f32; 6]> = RuntimeStore::new();
        bounds.insert(kept.uid, [0.0; 6]);
        bounds.insert(gone.uid, [1.0; 6]);
        registry.remove(gone);

        assert_eq!(bounds.retain_live(&registry), 1);
        assert_eq!(bounds.len(), 1);
        assert!(bounds.get(gone.uid).is_none());
        bounds.clear();
        assert!(bounds.is_empty());
    }
}
