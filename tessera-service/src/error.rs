use tessera_core::CoreError;
use tessera_model::ErrorKind;
use tessera_query::QueryError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full, try again")]
    Full,

    #[error("queue is closed")]
    Closed,
}

/// An item the queue refused, handed back to the caller.
#[derive(Debug)]
pub struct EnqueueError<T> {
    pub reason: QueueError,
    pub item: T,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Invalid(#[from] QueryError),

    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Invalid(e) => e.kind(),
            ServiceError::Queue(QueueError::Full) => ErrorKind::TransientIo,
            ServiceError::Queue(QueueError::Closed) => ErrorKind::Shutdown,
            ServiceError::Core(e) => e.kind(),
        }
    }
}
