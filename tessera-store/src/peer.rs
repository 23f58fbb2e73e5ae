//! DataPeer - abstraction over a CAS node with topic pub/sub
//!
//! The core is polymorphic over this trait; tests and the daemon supply
//! in-process peers.

use crate::PeerError;
use tessera_model::Address;

/// One message received on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identity of the publishing peer.
    pub from: String,
    pub data: Vec<u8>,
    pub seq_no: u64,
    pub topic_ids: Vec<String>,
}

#[async_trait::async_trait]
pub trait Subscription: Send {
    /// Wait for the next record. An error ends the subscription.
    async fn next(&mut self) -> Result<Record, PeerError>;
}

#[async_trait::async_trait]
pub trait DataPeer: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), PeerError>;

    async fn disconnect(&self) -> Result<(), PeerError>;

    async fn is_up(&self) -> bool;

    /// Store `data` verbatim and return its content address. Equal bytes
    /// always get the same address.
    async fn add(&self, data: Vec<u8>) -> Result<Address, PeerError>;

    async fn cat(&self, address: &Address) -> Result<Vec<u8>, PeerError>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), PeerError>;

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, PeerError>;
}
