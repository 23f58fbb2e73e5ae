//! Tessera Service
//!
//! The pieces in front of a [`tessera_core::RemoteNamespaceCore`]:
//!
//! - [`PriorityQueue`]: bounded command buffer ordered by request priority
//! - [`QueuedApiService`]: validates, queues and runs requests ([`ApiService`])
//! - [`Replicator`]: announces HEAD on topics and replicates what others announce

mod error;
mod queue;
mod replicator;
mod service;

pub use error::{EnqueueError, QueueError, ServiceError};
pub use queue::PriorityQueue;
pub use replicator::{Replicator, ReplicatorHandle, ReplicatorOptions};
pub use service::{ApiService, QueuedApiService, ServiceOptions};
