//! RemoteStore - typed namespace and index blobs over a DataPeer

use crate::peer::DataPeer;
use crate::StoreError;
use std::sync::Arc;
use tessera_model::codec::{decode_index, decode_namespace, encode_index, encode_namespace};
use tessera_model::{Address, Index, Namespace};

#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn add_namespace(&self, namespace: &Namespace) -> Result<Address, StoreError>;

    async fn cat_namespace(&self, address: &Address) -> Result<Namespace, StoreError>;

    async fn add_index(&self, index: &Index) -> Result<Address, StoreError>;

    async fn cat_index(&self, address: &Address) -> Result<Index, StoreError>;
}

/// Canonical encoding over any [`DataPeer`].
pub struct PeerStore<P: ?Sized> {
    peer: Arc<P>,
}

impl<P: DataPeer + ?Sized> PeerStore<P> {
    pub fn new(peer: Arc<P>) -> Self {
        Self { peer }
    }

    pub fn peer(&self) -> &Arc<P> {
        &self.peer
    }
}

#[async_trait::async_trait]
impl<P: DataPeer + ?Sized> RemoteStore for PeerStore<P> {
    async fn add_namespace(&self, namespace: &Namespace) -> Result<Address, StoreError> {
        let address = self.peer.add(encode_namespace(namespace)).await?;
        tracing::debug!(address = %address, tables = namespace.len(), "Stored namespace");
        Ok(address)
    }

    async fn cat_namespace(&self, address: &Address) -> Result<Namespace, StoreError> {
        let bytes = self.peer.cat(address).await?;
        Ok(decode_namespace(&bytes)?.into_logged(address.as_str()))
    }

    async fn add_index(&self, index: &Index) -> Result<Address, StoreError> {
        let address = self.peer.add(encode_index(index)).await?;
        tracing::debug!(address = %address, links = index.link_count(), "Stored index");
        Ok(address)
    }

    async fn cat_index(&self, address: &Address) -> Result<Index, StoreError> {
        let bytes = self.peer.cat(address).await?;
        Ok(decode_index(&bytes)?.into_logged(address.as_str()))
    }
}
