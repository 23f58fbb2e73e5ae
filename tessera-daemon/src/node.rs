//! A running peer: storage, core, queued API and replicator wired from config.

use crate::config::DaemonConfig;
use crate::keys::build_key_store;
use anyhow::Context;
use std::sync::Arc;
use tessera_cache::{Cache, MemoryCache, RedbCache};
use tessera_core::{CoreConfig, RemoteNamespaceCore};
use tessera_service::{ApiService, QueuedApiService, Replicator, ReplicatorHandle};
use tessera_store::{DataPeer, MemoryNetwork, MemoryPeer, PeerStore, RedbPeer};

pub struct Node {
    api: Arc<QueuedApiService>,
    replicator: Option<ReplicatorHandle>,
}

impl Node {
    /// Open storage and start every service. Pub/sub runs over `network`.
    pub async fn start(config: &DaemonConfig, network: &MemoryNetwork) -> anyhow::Result<Self> {
        let keys = Arc::new(build_key_store(config)?);

        let peer: Arc<dyn DataPeer>;
        let cache: Arc<dyn Cache>;
        match config.data_dir() {
            Some(dir) => {
                let storage = dir.storage();
                peer = Arc::new(
                    RedbPeer::open(config.peer_id.clone(), &storage, network)
                        .with_context(|| format!("opening blob store in {}", dir.base().display()))?,
                );
                cache = Arc::new(
                    RedbCache::open_with_capacity(&storage, config.cache_capacity)
                        .with_context(|| format!("opening cache in {}", dir.base().display()))?,
                );
            }
            None => {
                peer = Arc::new(MemoryPeer::new(config.peer_id.clone(), network));
                cache = Arc::new(MemoryCache::with_capacity(config.cache_capacity));
            }
        }
        peer.connect().await?;

        let store = Arc::new(PeerStore::new(peer.clone()));
        let core = RemoteNamespaceCore::start(
            CoreConfig::new(store, cache, keys.clone()).options(config.core_options()),
        )
        .await?;
        match core.head()? {
            Some(head) => tracing::info!(%head, "Loaded index"),
            None => tracing::info!("Starting with an empty index"),
        }

        let api = Arc::new(QueuedApiService::start(Arc::new(core), config.service_options()));

        let replicator = if config.replication.topics.is_empty() {
            tracing::info!("No replication topics, replicator disabled");
            None
        } else {
            let service: Arc<dyn ApiService> = api.clone();
            Some(Replicator::new(service, keys, peer, config.replicator_options()).start())
        };

        Ok(Self { api, replicator })
    }

    /// Stop replicating, then drain the API and close the core.
    pub async fn shutdown(self) {
        if let Some(replicator) = self.replicator {
            replicator.stop().await;
        }
        self.api.close_api().await;
    }
}
