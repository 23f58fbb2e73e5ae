//! Tessera Model
//!
//! Pure data types for Tessera: the CRDT namespace hierarchy, the index of
//! signed links, signatures and keys, and the canonical wire encoding shared
//! by every peer. Nothing in here performs I/O.

pub mod codec;
pub mod crdt;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod proto;
pub mod types;

// Re-exports
pub use codec::{Decoded, DecodeError, InvalidEntry, InvalidReason};
pub use crdt::{join_all, Entry, Index, Join, Link, LinkParseError, Namespace, Point, Row, Table};
pub use crypto::{CryptoError, KeyHash, PrivateKey, PublicKey};
pub use error::ErrorKind;
pub use keystore::{KeyStore, KeyStoreError};
pub use types::{Address, AddressError, Signature, SignatureError, SignatureSet};
