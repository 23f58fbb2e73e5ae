use tessera_model::{Address, DecodeError, ErrorKind};
use thiserror::Error;

/// Error type for CAS and pub/sub operations.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer is not connected")]
    Down,

    #[error("no blob at {0}")]
    NotFound(Address),

    #[error("subscription to {0} closed")]
    SubscriptionClosed(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeerError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::TransientIo,
        }
    }
}

macro_rules! backend_error {
    ($($err:ty),* $(,)?) => {
        $(impl From<$err> for PeerError {
            fn from(e: $err) -> Self {
                PeerError::Backend(e.to_string())
            }
        })*
    };
}

backend_error!(
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
    redb::StorageError,
);

/// Error type for typed blob operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Peer(e) => e.kind(),
            StoreError::Decode(_) => ErrorKind::Integrity,
        }
    }
}
