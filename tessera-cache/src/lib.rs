//! Tessera Cache
//!
//! Local caches sitting in front of the content-addressable store:
//!
//! - [`HeadCache`]: the current index address, updated in write transactions
//! - [`IndexCache`] / [`NamespaceCache`]: decoded blobs keyed by address
//! - [`MemoryImage`]: the running, merged index of this peer
//!
//! [`MemoryCache`] keeps everything in bounded maps; [`RedbCache`] persists to
//! an embedded redb database chosen by [`StorageConfig`].

mod error;
mod head;
mod image;
mod memory;
mod redb_cache;

pub use error::CacheError;
pub use head::{HeadCache, HeadReadTransaction, HeadWriteTransaction};
pub use image::MemoryImage;
pub use memory::MemoryCache;
pub use redb_cache::{RedbCache, StorageConfig};

use tessera_model::{Address, Index, Namespace};

/// Durable slot behind a [`HeadCache`].
pub trait HeadStore: Send + Sync {
    /// `Ok(None)` when no head was ever stored.
    fn load_head(&self) -> Result<Option<Address>, CacheError>;

    fn store_head(&self, head: &Address) -> Result<(), CacheError>;
}

/// Decoded indices keyed by the address they were stored under.
pub trait IndexCache: Send + Sync {
    /// Fails with [`CacheError::NotFound`] on a miss.
    fn get_index(&self, address: &Address) -> Result<Index, CacheError>;

    fn set_index(&self, address: &Address, index: &Index) -> Result<(), CacheError>;
}

/// Decoded namespaces keyed by the address they were stored under.
pub trait NamespaceCache: Send + Sync {
    /// Fails with [`CacheError::NotFound`] on a miss.
    fn get_namespace(&self, address: &Address) -> Result<Namespace, CacheError>;

    fn set_namespace(&self, address: &Address, namespace: &Namespace) -> Result<(), CacheError>;
}

/// Everything the core needs from a cache backend.
pub trait Cache: HeadStore + IndexCache + NamespaceCache {}

impl<T: HeadStore + IndexCache + NamespaceCache> Cache for T {}
