use tessera_cache::CacheError;
use tessera_model::{Address, ErrorKind, KeyStoreError};
use tessera_query::QueryError;
use tessera_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("table name is empty")]
    EmptyTable,

    #[error("no head set")]
    NoHead,

    #[error("core is shutting down")]
    Shutdown,

    #[error("link to {0} carries no trusted signature")]
    Untrusted(Address),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::EmptyTable | CoreError::Query(_) => ErrorKind::Input,
            CoreError::NoHead => ErrorKind::NotFound,
            CoreError::Shutdown => ErrorKind::Shutdown,
            CoreError::Untrusted(_) => ErrorKind::Integrity,
            CoreError::Store(e) => e.kind(),
            CoreError::Cache(e) => e.kind(),
            CoreError::KeyStore(_) => ErrorKind::Internal,
        }
    }
}
