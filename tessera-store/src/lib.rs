//! Tessera Store
//!
//! The content-addressable store (CAS) and pub/sub bus a peer talks to.
//!
//! - [`DataPeer`]: raw bytes in, content address out, plus topic pub/sub
//! - [`MemoryPeer`] / [`MemoryNetwork`]: in-process peers sharing one CAS
//! - [`RedbPeer`]: blobs persisted in redb, pub/sub over a [`MemoryNetwork`]
//! - [`RemoteStore`] / [`PeerStore`]: typed namespace and index blobs over any peer

mod error;
mod memory;
mod peer;
mod redb_peer;
mod remote;

pub use error::{PeerError, StoreError};
pub use memory::{MemoryNetwork, MemoryPeer};
pub use peer::{DataPeer, Record, Subscription};
pub use redb_peer::RedbPeer;
pub use remote::{PeerStore, RemoteStore};
