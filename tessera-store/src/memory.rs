//! MemoryPeer - in-process DataPeer
//!
//! A shared `MemoryNetwork` broker holds the content-addressed blobs and one
//! broadcast channel per topic. Every `MemoryPeer` built on the same network
//! sees the same blobs and the same topics.

use crate::peer::{DataPeer, Record, Subscription};
use crate::PeerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_model::crypto::content_address;
use tessera_model::Address;
use tokio::sync::{broadcast, RwLock};

const TOPIC_CAPACITY: usize = 256;

/// Shared broker routing blobs and topic messages between peers.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    blobs: Arc<RwLock<HashMap<Address, Arc<Vec<u8>>>>>,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Record>>>>,
    seq: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    async fn topic(&self, topic: &str) -> broadcast::Sender<Record> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub(crate) async fn publish(&self, from: &str, topic: &str, data: Vec<u8>) {
        let sender = self.topic(topic).await;
        let record = Record {
            from: from.to_string(),
            data,
            seq_no: self.seq.fetch_add(1, Ordering::SeqCst),
            topic_ids: vec![topic.to_string()],
        };
        // No receivers is not an error: nobody is listening yet.
        let _ = sender.send(record);
    }

    pub(crate) async fn subscribe(&self, topic: &str) -> Box<dyn Subscription> {
        let receiver = self.topic(topic).await.subscribe();
        Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver,
        })
    }

    /// Number of blobs stored on the network.
    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }
}

struct MemorySubscription {
    topic: String,
    receiver: broadcast::Receiver<Record>,
}

#[async_trait::async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Record, PeerError> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Ok(record),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(topic = %self.topic, lagged = n, "Subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PeerError::SubscriptionClosed(self.topic.clone()));
                }
            }
        }
    }
}

/// In-memory DataPeer attached to a [`MemoryNetwork`].
pub struct MemoryPeer {
    id: String,
    network: MemoryNetwork,
    up: AtomicBool,
    cats: AtomicUsize,
}

impl MemoryPeer {
    /// A connected peer.
    pub fn new(id: impl Into<String>, network: &MemoryNetwork) -> Self {
        Self {
            id: id.into(),
            network: network.clone(),
            up: AtomicBool::new(true),
            cats: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of `cat` calls served so far.
    pub fn cat_count(&self) -> usize {
        self.cats.load(Ordering::SeqCst)
    }

    fn ensure_up(&self) -> Result<(), PeerError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PeerError::Down)
        }
    }
}

#[async_trait::async_trait]
impl DataPeer for MemoryPeer {
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
        self.network
            .blobs
            .write()
            .await
            .entry(address.clone())
            .or_insert_with(|| Arc::new(data));
        tracing::trace!(peer = %self.id, address = %address, "Stored blob");
        Ok(address)
    }

    async fn cat(&self, address: &Address) -> Result<Vec<u8>, PeerError> {
        self.ensure_up()?;
        self.cats.fetch_add(1, Ordering::SeqCst);
        let blobs = self.network.blobs.read().await;
        blobs
            .get(address)
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| PeerError::NotFound(address.clone()))
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
