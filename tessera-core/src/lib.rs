//! Tessera Core
//!
//! [`RemoteNamespaceCore`] holds the peer's merged index, writes blobs to the
//! CAS through its tubes, answers [`Request`]s and periodically moves HEAD.
//!
//! - [`api`]: requests, responses, priorities and commands
//! - [`search`]: searchers driven by a load-traverse
//! - [`wire`]: protobuf envelope for requests and responses

pub mod api;
mod error;
mod remote;
pub mod search;
mod tube;
pub mod wire;

pub use api::{Command, Priority, ReflectKind, Request, RequestKind, Response, ResponseError, ERROR_MSG};
pub use error::CoreError;
pub use remote::{CoreConfig, CoreOptions, RemoteNamespaceCore};
pub use search::{DumpSearcher, SearchFailure, SearchResult, Searcher, SelectSearcher};
