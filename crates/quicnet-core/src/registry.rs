//! Handle registry
//!
//! Maps engine handles back to the object that owns them so that callbacks,
//! which carry nothing but a raw handle, can be routed. Lookups of unknown
//! handles are an ordinary outcome: callbacks may still be in flight for an
//! object that has already been disposed.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::engine::RawHandle;

/// Concurrent handle-to-instance map
#[derive(Debug)]
pub struct HandleRegistry<T> {
    next_id: AtomicU64,
    entries: DashMap<RawHandle, T>,
}

impl<T: Clone> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Register an instance under a freshly allocated handle
    ///
    /// Allocated handles are never reused for the lifetime of the registry.
    pub fn register(&self, instance: T) -> RawHandle {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let Some(handle) = RawHandle::new(id) else {
                continue;
            };
            // Skip ids already taken through `insert`
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.entries.entry(handle) {
                slot.insert(instance);
                return handle;
            }
        }
    }

    /// Register an instance under a handle allocated elsewhere
    ///
    /// Returns the previous instance if the handle was already registered.
    pub fn insert(&self, handle: RawHandle, instance: T) -> Option<T> {
        self.entries.insert(handle, instance)
    }

    pub fn lookup(&self, handle: RawHandle) -> Option<T> {
        self.entries.get(&handle).map(|entry| entry.value().clone())
    }

    /// Remove a handle; returns whether it was registered
    pub fn remove(&self, handle: RawHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn contains(&self, handle: RawHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_lookup_remove() {
        let registry = HandleRegistry::new();
        let handle = registry.register("connection");

        assert_eq!(registry.lookup(handle), Some("connection"));
        assert!(registry.remove(handle));
        assert_eq!(registry.lookup(handle), None);
        assert!(!registry.remove(handle));
    }

    #[test]
    fn test_handles_are_not_reused() {
        let registry = HandleRegistry::new();
        let first = registry.register(1u32);
        registry.remove(first);
        let second = registry.register(2u32);

        assert_ne!(first, second);
        assert_eq!(registry.lookup(first), None);
    }

    #[test]
    fn test_register_skips_inserted_handles() {
        let registry = HandleRegistry::new();
        let taken = RawHandle::new(1).unwrap();
        registry.insert(taken, "external");

        let allocated = registry.register("allocated");
        assert_ne!(allocated, taken);
        assert_eq!(registry.lookup(taken), Some("external"));
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(HandleRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| registry.register(worker * 1000 + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut handles: Vec<RawHandle> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        handles.sort();
        handles.dedup();

        assert_eq!(handles.len(), 800);
        assert_eq!(registry.len(), 800);
    }
}
