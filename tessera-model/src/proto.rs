//! Wire messages for namespace and index blobs
//!
//! Schema reference lives in `proto/tessera.proto`; the structs are derived
//! by hand so the crate builds without `protoc`.

/// A namespace as a flat stream of (table, row, entry, points) tuples.
#[derive(Clone, PartialEq, prost::Message)]
pub struct NamespaceMessage {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<NamespaceEntryMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NamespaceEntryMessage {
    #[prost(string, tag = "1")]
    pub table: String,

    #[prost(string, tag = "2")]
    pub row: String,

    #[prost(string, tag = "3")]
    pub entry: String,

    #[prost(message, repeated, tag = "4")]
    pub points: Vec<PointMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PointMessage {
    #[prost(string, tag = "1")]
    pub text: String,

    /// Base58 signature text, sorted.
    #[prost(string, repeated, tag = "2")]
    pub signatures: Vec<String>,
}

/// An index as a stream of (table, links) pairs.
#[derive(Clone, PartialEq, prost::Message)]
pub struct IndexMessage {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<IndexEntryMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct IndexEntryMessage {
    #[prost(string, tag = "1")]
    pub table: String,

    #[prost(message, repeated, tag = "2")]
    pub links: Vec<LinkMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LinkMessage {
    #[prost(string, tag = "1")]
    pub address: String,

    #[prost(string, repeated, tag = "2")]
    pub signatures: Vec<String>,
}
