use tessera_model::{Address, DecodeError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{0} not cached")]
    NotFound(String),

    #[error("no head set")]
    NoHead,

    #[error("no pending write to roll back")]
    NoActiveWrite,

    #[error("cache lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Stored head is not an address: {0}")]
    CorruptHead(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn missing(address: &Address) -> Self {
        CacheError::NotFound(address.to_string())
    }

    /// True for a cache miss, which callers answer by reading the CAS.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::NotFound(_) | CacheError::NoHead => ErrorKind::NotFound,
            CacheError::NoActiveWrite | CacheError::LockPoisoned => ErrorKind::Internal,
            CacheError::Decode(_) | CacheError::CorruptHead(_) => ErrorKind::Integrity,
            _ => ErrorKind::TransientIo,
        }
    }
}
