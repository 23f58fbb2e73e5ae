//! MemoryImage - the peer's running, merged index

use crate::CacheError;
use std::sync::Mutex;
use tessera_model::{Index, Join};

/// Single mutable holder of the merged index. Every access takes the lock,
/// so a reader never observes half of a join.
#[derive(Default)]
pub struct MemoryImage {
    index: Mutex<Index>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current index.
    pub fn get_index(&self) -> Result<Index, CacheError> {
        Ok(self.index.lock().map_err(|_| CacheError::LockPoisoned)?.clone())
    }

    /// Join `other` into the image. Returns true if the image changed.
    pub fn join_index(&self, other: &Index) -> Result<bool, CacheError> {
        let mut index = self.index.lock().map_err(|_| CacheError::LockPoisoned)?;
        let joined = index.join(other);
        if joined == *index {
            return Ok(false);
        }
        *index = joined;
        Ok(true)
    }
}
