//! HeadCache - transactional slot for the current index address
//!
//! Readers share the slot; a writer holds it exclusively until it commits or
//! rolls back. `set_head` remembers the value it replaced so an abandoned
//! write can be undone, and `commit` is the only path that reaches the
//! backing [`HeadStore`].

use crate::{Cache, CacheError, HeadStore};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_model::Address;

pub struct HeadCache<S: ?Sized = dyn Cache> {
    slot: RwLock<Option<Address>>,
    store: Arc<S>,
}

impl<S: HeadStore + ?Sized> HeadCache<S> {
    /// Load the last committed head from `store`.
    pub fn open(store: Arc<S>) -> Result<Self, CacheError> {
        let head = store.load_head()?;
        Ok(Self {
            slot: RwLock::new(head),
            store,
        })
    }

    pub fn begin_read_transaction(&self) -> Result<HeadReadTransaction<'_>, CacheError> {
        let guard = self.slot.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(HeadReadTransaction { guard })
    }

    pub fn begin_write_transaction(&self) -> Result<HeadWriteTransaction<'_, S>, CacheError> {
        let guard = self.slot.write().map_err(|_| CacheError::LockPoisoned)?;
        Ok(HeadWriteTransaction {
            guard,
            store: &self.store,
            replaced: None,
        })
    }

    /// Current head, or `None` if nothing was ever committed.
    pub fn head(&self) -> Result<Option<Address>, CacheError> {
        match self.begin_read_transaction()?.get_head() {
            Ok(head) => Ok(Some(head)),
            Err(CacheError::NoHead) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub struct HeadReadTransaction<'a> {
    guard: RwLockReadGuard<'a, Option<Address>>,
}

impl HeadReadTransaction<'_> {
    pub fn get_head(&self) -> Result<Address, CacheError> {
        self.guard.clone().ok_or(CacheError::NoHead)
    }
}

/// Exclusive access to the head. Dropping it without `commit` rolls back.
pub struct HeadWriteTransaction<'a, S: HeadStore + ?Sized> {
    guard: RwLockWriteGuard<'a, Option<Address>>,
    store: &'a Arc<S>,
    /// Value before the first uncommitted `set_head`.
    replaced: Option<Option<Address>>,
}

impl<S: HeadStore + ?Sized> HeadWriteTransaction<'_, S> {
    pub fn get_head(&self) -> Result<Address, CacheError> {
        self.guard.clone().ok_or(CacheError::NoHead)
    }

    pub fn set_head(&mut self, head: Address) {
        let previous = self.guard.replace(head);
        if self.replaced.is_none() {
            self.replaced = Some(previous);
        }
    }

    /// Persist the head and release the slot. On a store failure the slot is
    /// restored and the error returned.
    pub fn commit(mut self) -> Result<(), CacheError> {
        if self.replaced.is_none() {
            return Ok(());
        }
        if let Some(head) = self.guard.as_ref() {
            if let Err(e) = self.store.store_head(head) {
                self.restore();
                return Err(e);
            }
        }
        self.replaced = None;
        Ok(())
    }

    /// Undo every `set_head` since the transaction began.
    pub fn rollback(&mut self) -> Result<(), CacheError> {
        if self.replaced.is_none() {
            return Err(CacheError::NoActiveWrite);
        }
        self.restore();
        Ok(())
    }

    fn restore(&mut self) {
        if let Some(previous) = self.replaced.take() {
            *self.guard = previous;
        }
    }
}

impl<S: HeadStore + ?Sized> Drop for HeadWriteTransaction<'_, S> {
    fn drop(&mut self) {
        if self.replaced.is_some() {
            tracing::debug!("Rolling back uncommitted head write");
            self.restore();
        }
    }
}
