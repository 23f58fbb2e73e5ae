//! MemoryCache - bounded in-process cache
//!
//! Index and namespace maps evict the oldest insertion once full, so `set`
//! never fails under pressure. The head slot is a plain value.

use crate::{CacheError, HeadStore, IndexCache, NamespaceCache};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tessera_model::{Address, Index, Namespace};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Insertion-ordered map with a fixed capacity.
struct Bounded<V> {
    values: HashMap<Address, V>,
    order: VecDeque<Address>,
    capacity: usize,
}

impl<V: Clone> Bounded<V> {
    fn new(capacity: usize) -> Self {
        Self {
            values: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, address: &Address) -> Option<V> {
        self.values.get(address).cloned()
    }

    fn insert(&mut self, address: &Address, value: V) {
        if self.values.insert(address.clone(), value).is_some() {
            return;
        }
        self.order.push_back(address.clone());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.values.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

pub struct MemoryCache {
    head: Mutex<Option<Address>>,
    indices: Mutex<Bounded<Index>>,
    namespaces: Mutex<Bounded<Namespace>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    /// Each of the index and namespace maps holds at most `capacity` blobs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            head: Mutex::new(None),
            indices: Mutex::new(Bounded::new(capacity)),
            namespaces: Mutex::new(Bounded::new(capacity)),
        }
    }

    /// Number of cached (indices, namespaces).
    pub fn len(&self) -> Result<(usize, usize), CacheError> {
        let indices = self.indices.lock().map_err(|_| CacheError::LockPoisoned)?.len();
        let namespaces = self.namespaces.lock().map_err(|_| CacheError::LockPoisoned)?.len();
        Ok((indices, namespaces))
    }
}

impl HeadStore for MemoryCache {
    fn load_head(&self) -> Result<Option<Address>, CacheError> {
        Ok(self.head.lock().map_err(|_| CacheError::LockPoisoned)?.clone())
    }

    fn store_head(&self, head: &Address) -> Result<(), CacheError> {
        *self.head.lock().map_err(|_| CacheError::LockPoisoned)? = Some(head.clone());
        Ok(())
    }
}

impl IndexCache for MemoryCache {
    fn get_index(&self, address: &Address) -> Result<Index, CacheError> {
        self.indices
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(address)
            .ok_or_else(|| CacheError::missing(address))
    }

    fn set_index(&self, address: &Address, index: &Index) -> Result<(), CacheError> {
        self.indices
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?
            .insert(address, index.clone());
        Ok(())
    }
}

impl NamespaceCache for MemoryCache {
    fn get_namespace(&self, address: &Address) -> Result<Namespace, CacheError> {
        self.namespaces
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(address)
            .ok_or_else(|| CacheError::missing(address))
    }

    fn set_namespace(&self, address: &Address, namespace: &Namespace) -> Result<(), CacheError> {
        self.namespaces
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?
            .insert(address, namespace.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_model::Link;

    fn addr(n: usize) -> Address {
        Address::new(format!("Qm{}", "z".repeat(n + 1))).unwrap()
    }

    #[test]
    fn test_miss_is_not_found() {
        let cache = MemoryCache::default();
        let err = cache.get_index(&addr(0)).unwrap_err();
        assert!(err.is_miss());
        assert!(cache.get_namespace(&addr(0)).unwrap_err().is_miss());
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::default();
        let index = Index::single("cars", Link::unsigned(addr(1)));
        cache.set_index(&addr(0), &index).unwrap();
        assert_eq!(cache.get_index(&addr(0)).unwrap(), index);
    }

    #[test]
    fn test_oldest_entry_evicted() {
        let cache = MemoryCache::with_capacity(2);
        for n in 0..3 {
            cache.set_namespace(&addr(n), &Namespace::new()).unwrap();
        }
        assert!(cache.get_namespace(&addr(0)).unwrap_err().is_miss());
        assert!(cache.get_namespace(&addr(1)).is_ok());
        assert!(cache.get_namespace(&addr(2)).is_ok());
        assert_eq!(cache.len().unwrap(), (0, 2));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::with_capacity(2);
        cache.set_index(&addr(0), &Index::new()).unwrap();
        cache.set_index(&addr(1), &Index::new()).unwrap();
        cache.set_index(&addr(1), &Index::new()).unwrap();
        assert!(cache.get_index(&addr(0)).is_ok());
    }
}
