//! RedbCache - embedded persistent cache
//!
//! Tables:
//! - head: "head" → address text
//! - indices: address → encoded IndexMessage
//! - namespaces: address → encoded NamespaceMessage
//! - indices_order / namespaces_order: insertion sequence → address
//!
//! Blobs are stored in their canonical encoding and decoded on read. Each
//! blob table holds at most `capacity` rows; inserting past that deletes the
//! oldest rows in the same write transaction.

use crate::{CacheError, HeadStore, IndexCache, NamespaceCache};
use crate::memory::DEFAULT_CAPACITY;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::PathBuf;
use tessera_model::codec::{decode_index, decode_namespace, encode_index, encode_namespace};
use tessera_model::{Address, Index, Namespace};

const TABLE_HEAD: TableDefinition<&str, &str> = TableDefinition::new("head");
const TABLE_INDICES: TableDefinition<&str, &[u8]> = TableDefinition::new("indices");
const TABLE_NAMESPACES: TableDefinition<&str, &[u8]> = TableDefinition::new("namespaces");
const TABLE_INDICES_ORDER: TableDefinition<u64, &str> = TableDefinition::new("indices_order");
const TABLE_NAMESPACES_ORDER: TableDefinition<u64, &str> = TableDefinition::new("namespaces_order");

type BlobTable = TableDefinition<'static, &'static str, &'static [u8]>;
type OrderTable = TableDefinition<'static, u64, &'static str>;

const KEY_HEAD: &str = "head";
const DB_FILE: &str = "cache.redb";

/// Where to store data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// File-backed storage in the given directory.
    File(PathBuf),
    /// In-memory storage (no filesystem). Useful for tests.
    InMemory,
}

pub struct RedbCache {
    db: Database,
    capacity: usize,
}

impl RedbCache {
    pub fn open(config: &StorageConfig) -> Result<Self, CacheError> {
        Self::open_with_capacity(config, DEFAULT_CAPACITY)
    }

    /// Each of the index and namespace tables keeps at most `capacity` blobs.
    pub fn open_with_capacity(config: &StorageConfig, capacity: usize) -> Result<Self, CacheError> {
        let db = match config {
            StorageConfig::File(dir) => {
                std::fs::create_dir_all(dir)?;
                Database::create(dir.join(DB_FILE))?
            }
            StorageConfig::InMemory => {
                Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?
            }
        };
        Ok(Self {
            db,
            capacity: capacity.max(1),
        })
    }

    fn get_bytes(&self, table: BlobTable, address: &Address) -> Result<Vec<u8>, CacheError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(table) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Err(CacheError::missing(address)),
            Err(e) => return Err(e.into()),
        };
        let value = table.get(address.as_str())?.map(|v| v.value().to_vec());
        value.ok_or_else(|| CacheError::missing(address))
    }

    fn put_bytes(
        &self,
        table: BlobTable,
        order: OrderTable,
        address: &Address,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        let txn = self.db.begin_write()?;
        let mut evicted = 0usize;
        {
            let mut blobs = txn.open_table(table)?;
            let mut order = txn.open_table(order)?;
            let existed = blobs.insert(address.as_str(), bytes)?.is_some();
            if !existed {
                let next = order.last()?.map_or(0, |(seq, _)| seq.value() + 1);
                order.insert(next, address.as_str())?;
                while order.len()? > self.capacity as u64 {
                    let Some((_, oldest)) = order.pop_first()? else {
                        break;
                    };
                    blobs.remove(oldest.value())?;
                    evicted += 1;
                }
            }
        }
        txn.commit()?;
        if evicted > 0 {
            tracing::trace!(evicted, "Evicted oldest cached blobs");
        }
        Ok(())
    }

    /// Number of cached (indices, namespaces).
    pub fn len(&self) -> Result<(usize, usize), CacheError> {
        let txn = self.db.begin_read()?;
        let count = |table: BlobTable| -> Result<usize, CacheError> {
            match txn.open_table(table) {
                Ok(t) => Ok(t.len()? as usize),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
                Err(e) => Err(e.into()),
            }
        };
        Ok((count(TABLE_INDICES)?, count(TABLE_NAMESPACES)?))
    }
}

impl HeadStore for RedbCache {
    fn load_head(&self) -> Result<Option<Address>, CacheError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(TABLE_HEAD) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(text) = table.get(KEY_HEAD)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        Address::new(text.as_str())
            .map(Some)
            .map_err(|_| CacheError::CorruptHead(text))
    }

    fn store_head(&self, head: &Address) -> Result<(), CacheError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TABLE_HEAD)?;
            table.insert(KEY_HEAD, head.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl IndexCache for RedbCache {
    fn get_index(&self, address: &Address) -> Result<Index, CacheError> {
        let bytes = self.get_bytes(TABLE_INDICES, address)?;
        Ok(decode_index(&bytes)?.into_logged("cached index"))
    }

    fn set_index(&self, address: &Address, index: &Index) -> Result<(), CacheError> {
        self.put_bytes(TABLE_INDICES, TABLE_INDICES_ORDER, address, &encode_index(index))
    }
}

impl NamespaceCache for RedbCache {
    fn get_namespace(&self, address: &Address) -> Result<Namespace, CacheError> {
        let bytes = self.get_bytes(TABLE_NAMESPACES, address)?;
        Ok(decode_namespace(&bytes)?.into_logged("cached namespace"))
    }

    fn set_namespace(&self, address: &Address, namespace: &Namespace) -> Result<(), CacheError> {
        self.put_bytes(TABLE_NAMESPACES, TABLE_NAMESPACES_ORDER, address, &encode_namespace(namespace))
    }
}
