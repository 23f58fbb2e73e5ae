//! RedbPeer - DataPeer with blobs persisted in redb
//!
//! Blobs live in a single `blobs` table keyed by content address. Pub/sub is
//! routed over a [`MemoryNetwork`] so several in-process peers can still
//! exchange announcements.

use crate::memory::MemoryNetwork;
use crate::peer::{DataPeer, Subscription};
use crate::PeerError;
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_cache::StorageConfig;
use tessera_model::crypto::content_address;
use tessera_model::Address;

const TABLE_BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");
const DB_FILE: &str = "blobs.redb";

pub struct RedbPeer {
    id: String,
    db: Arc<Database>,
    network: MemoryNetwork,
    up: AtomicBool,
}

impl RedbPeer {
    pub fn open(
        id: impl Into<String>,
        config: &StorageConfig,
        network: &MemoryNetwork,
    ) -> Result<Self, PeerError> {
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
            id: id.into(),
            db: Arc::new(db),
            network: network.clone(),
            up: AtomicBool::new(true),
        })
    }

    fn ensure_up(&self) -> Result<(), PeerError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PeerError::Down)
        }
    }

    fn put_blob(db: &Database, address: &Address, data: &[u8]) -> Result<(), PeerError> {
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(TABLE_BLOBS)?;
            table.insert(address.as_str(), data)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_blob(db: &Database, address: &Address) -> Result<Vec<u8>, PeerError> {
        let txn = db.begin_read()?;
        let table = match txn.open_table(TABLE_BLOBS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => {
                return Err(PeerError::NotFound(address.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let value = table.get(address.as_str())?.map(|v| v.value().to_vec());
        value.ok_or_else(|| PeerError::NotFound(address.clone()))
    }
}

#[async_trait::async_trait]
impl DataPeer for RedbPeer {
    async fn connect(&self) -> Result<(), PeerError> {
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PeerError> {
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn add(&self, data: Vec<u8>) -> Result<Address, PeerError> {
        self.ensure_up()?;
        let address = content_address(&data);
        let db = self.db.clone();
        let key = address.clone();
        tokio::task::spawn_blocking(move || Self::put_blob(&db, &key, &data))
            .await
            .map_err(|e| PeerError::Backend(e.to_string()))??;
        Ok(address)
    }

    async fn cat(&self, address: &Address) -> Result<Vec<u8>, PeerError> {
        self.ensure_up()?;
        let db = self.db.clone();
        let key = address.clone();
        tokio::task::spawn_blocking(move || Self::get_blob(&db, &key))
            .await
            .map_err(|e| PeerError::Backend(e.to_string()))?
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), PeerError> {
        self.ensure_up()?;
        self.network.publish(&self.id, topic, data).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, PeerError> {
        self.ensure_up()?;
        Ok(self.network.subscribe(topic).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::File(dir.path().to_path_buf());
        let network = MemoryNetwork::new();

        let address = {
            let peer = RedbPeer::open("a", &config, &network).unwrap();
            peer.add(b"durable".to_vec()).await.unwrap()
        };

        let peer = RedbPeer::open("a", &config, &network).unwrap();
        assert_eq!(peer.cat(&address).await.unwrap(), b"durable");
    }

    #[tokio::test]
    async fn test_same_address_as_memory_peer() {
        let network = MemoryNetwork::new();
        let redb = RedbPeer::open("a", &StorageConfig::InMemory, &network).unwrap();
        let memory = crate::MemoryPeer::new("b", &network);

        assert_eq!(
            redb.add(b"blob".to_vec()).await.unwrap(),
            memory.add(b"blob".to_vec()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let network = MemoryNetwork::new();
        let peer = RedbPeer::open("a", &StorageConfig::InMemory, &network).unwrap();
        assert!(matches!(
            peer.cat(&content_address(b"nothing")).await,
            Err(PeerError::NotFound(_))
        ));
    }
}
