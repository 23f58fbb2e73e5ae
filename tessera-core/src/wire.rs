//! Request / response envelope
//!
//! Hand-derived prost messages mirroring `proto/tessera.proto` in
//! tessera-model. Where clauses nest through `WhereListMessage`, so `not`
//! carries a one-element list rather than a boxed child.

use crate::api::{ReflectKind, Request, RequestKind, Response, ResponseError};
use prost::Message;
use tessera_model::codec::{index_from_message, index_to_message, namespace_from_message, namespace_to_message};
use tessera_model::proto::{IndexMessage, NamespaceMessage};
use tessera_model::{Address, AddressError, ErrorKind, Link, LinkParseError};
use tessera_query::{JoinQuery, JoinRow, Operand, Predicate, Query, SelectQuery, Where};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("missing field: {0}")]
    Missing(&'static str),

    #[error("unknown {field} value: {value}")]
    UnknownEnum { field: &'static str, value: i32 },

    #[error("not must have exactly one child, got {0}")]
    NotArity(usize),

    #[error("invalid link: {0}")]
    Link(#[from] LinkParseError),

    #[error("invalid path: {0}")]
    Path(#[from] AddressError),

    #[error("unknown error kind: {0}")]
    ErrorKind(String),
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct RequestMessage {
    #[prost(oneof = "request_message::Body", tags = "1, 2, 3")]
    pub body: Option<request_message::Body>,
}

pub mod request_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Query(super::QueryMessage),
        #[prost(message, tag = "2")]
        Replicate(super::ReplicateMessage),
        #[prost(message, tag = "3")]
        Reflect(super::ReflectMessage),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryMessage {
    #[prost(oneof = "query_message::Query", tags = "1, 2")]
    pub query: Option<query_message::Query>,
}

pub mod query_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Query {
        #[prost(message, tag = "1")]
        Select(super::SelectMessage),
        #[prost(message, tag = "2")]
        Join(super::JoinMessage),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct SelectMessage {
    #[prost(string, tag = "1")]
    pub table: String,
    #[prost(message, optional, tag = "2")]
    pub where_clause: Option<WhereMessage>,
    #[prost(uint32, tag = "3")]
    pub limit: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct WhereMessage {
    #[prost(oneof = "where_message::Clause", tags = "1, 2, 3, 4")]
    pub clause: Option<where_message::Clause>,
}

pub mod where_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Clause {
        #[prost(message, tag = "1")]
        And(super::WhereListMessage),
        #[prost(message, tag = "2")]
        Or(super::WhereListMessage),
        #[prost(message, tag = "3")]
        Not(super::WhereListMessage),
        #[prost(message, tag = "4")]
        Predicate(super::PredicateMessage),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct WhereListMessage {
    #[prost(message, repeated, tag = "1")]
    pub clauses: Vec<WhereMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PredicateMessage {
    #[prost(string, tag = "1")]
    pub function: String,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<OperandMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperandMessage {
    #[prost(oneof = "operand_message::Operand", tags = "1, 2, 3")]
    pub operand: Option<operand_message::Operand>,
}

pub mod operand_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Operand {
        #[prost(string, tag = "1")]
        Entry(String),
        #[prost(bool, tag = "2")]
        RowKey(bool),
        #[prost(string, tag = "3")]
        Literal(String),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinMessage {
    #[prost(string, tag = "1")]
    pub table: String,
    #[prost(message, repeated, tag = "2")]
    pub rows: Vec<JoinRowMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinRowMessage {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<JoinEntryMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub values: Vec<String>,
}

/// Links in their `address[:signature]*` text form.
#[derive(Clone, PartialEq, Message)]
pub struct ReplicateMessage {
    #[prost(string, repeated, tag = "1")]
    pub links: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReflectMessage {
    #[prost(enumeration = "ReflectKindMessage", tag = "1")]
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ReflectKindMessage {
    HeadPath = 0,
    Index = 1,
    DumpNamespace = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RequestKindMessage {
    Query = 0,
    Replicate = 1,
    Reflect = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResponseMessage {
    #[prost(enumeration = "RequestKindMessage", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
    /// Empty when the request succeeded.
    #[prost(string, tag = "3")]
    pub err: String,
    #[prost(string, tag = "4")]
    pub err_kind: String,
    #[prost(string, tag = "5")]
    pub path: String,
    #[prost(message, optional, tag = "6")]
    pub index: Option<IndexMessage>,
    #[prost(message, optional, tag = "7")]
    pub namespace: Option<NamespaceMessage>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn encode_request(request: &Request) -> Vec<u8> {
    RequestMessage::from(request).encode_to_vec()
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, WireError> {
    Request::try_from(RequestMessage::decode(bytes)?)
}

impl From<&Request> for RequestMessage {
    fn from(request: &Request) -> Self {
        let body = match request {
            Request::Query(query) => request_message::Body::Query(QueryMessage {
                query: Some(query_to_message(query)),
            }),
            Request::Replicate(links) => request_message::Body::Replicate(ReplicateMessage {
                links: links.iter().map(Link::to_string).collect(),
            }),
            Request::Reflect(kind) => request_message::Body::Reflect(ReflectMessage {
                kind: ReflectKindMessage::from(*kind) as i32,
            }),
        };
        RequestMessage { body: Some(body) }
    }
}

impl TryFrom<RequestMessage> for Request {
    type Error = WireError;

    fn try_from(message: RequestMessage) -> Result<Self, WireError> {
        match message.body.ok_or(WireError::Missing("request"))? {
            request_message::Body::Query(q) => {
                let query = q.query.ok_or(WireError::Missing("query"))?;
                Ok(Request::Query(query_from_message(query)?))
            }
            request_message::Body::Replicate(r) => {
                let links = r
                    .links
                    .iter()
                    .map(|text| text.parse::<Link>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Request::Replicate(links))
            }
            request_message::Body::Reflect(r) => {
                let kind = ReflectKindMessage::try_from(r.kind).map_err(|_| WireError::UnknownEnum {
                    field: "reflect kind",
                    value: r.kind,
                })?;
                Ok(Request::Reflect(kind.into()))
            }
        }
    }
}

impl From<ReflectKind> for ReflectKindMessage {
    fn from(kind: ReflectKind) -> Self {
        match kind {
            ReflectKind::HeadPath => ReflectKindMessage::HeadPath,
            ReflectKind::Index => ReflectKindMessage::Index,
            ReflectKind::DumpNamespace => ReflectKindMessage::DumpNamespace,
        }
    }
}

impl From<ReflectKindMessage> for ReflectKind {
    fn from(kind: ReflectKindMessage) -> Self {
        match kind {
            ReflectKindMessage::HeadPath => ReflectKind::HeadPath,
            ReflectKindMessage::Index => ReflectKind::Index,
            ReflectKindMessage::DumpNamespace => ReflectKind::DumpNamespace,
        }
    }
}

fn query_to_message(query: &Query) -> query_message::Query {
    match query {
        Query::Select(q) => query_message::Query::Select(SelectMessage {
            table: q.table.clone(),
            where_clause: q.where_clause.as_ref().map(where_to_message),
            limit: q.limit,
        }),
        Query::Join(q) => query_message::Query::Join(JoinMessage {
            table: q.table.clone(),
            rows: q
                .rows
                .iter()
                .map(|row| JoinRowMessage {
                    key: row.key.clone(),
                    entries: row
                        .entries
                        .iter()
                        .map(|(name, values)| JoinEntryMessage {
                            name: name.clone(),
                            values: values.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }),
    }
}

fn query_from_message(message: query_message::Query) -> Result<Query, WireError> {
    match message {
        query_message::Query::Select(s) => Ok(Query::Select(SelectQuery {
            table: s.table,
            where_clause: s.where_clause.map(where_from_message).transpose()?,
            limit: s.limit,
        })),
        query_message::Query::Join(j) => {
            let rows = j
                .rows
                .into_iter()
                .map(|row| JoinRow {
                    key: row.key,
                    entries: row.entries.into_iter().map(|e| (e.name, e.values)).collect(),
                })
                .collect();
            Ok(Query::Join(JoinQuery { table: j.table, rows }))
        }
    }
}

fn where_to_message(clause: &Where) -> WhereMessage {
    let list = |children: &[Where]| WhereListMessage {
        clauses: children.iter().map(where_to_message).collect(),
    };
    let clause = match clause {
        Where::And(children) => where_message::Clause::And(list(children)),
        Where::Or(children) => where_message::Clause::Or(list(children)),
        Where::Not(child) => where_message::Clause::Not(list(std::slice::from_ref(child.as_ref()))),
        Where::Predicate(p) => where_message::Clause::Predicate(PredicateMessage {
            function: p.function.clone(),
            args: p.args.iter().map(operand_to_message).collect(),
        }),
    };
    WhereMessage { clause: Some(clause) }
}

fn where_from_message(message: WhereMessage) -> Result<Where, WireError> {
    let list = |l: WhereListMessage| -> Result<Vec<Where>, WireError> {
        l.clauses.into_iter().map(where_from_message).collect()
    };
    match message.clause.ok_or(WireError::Missing("where clause"))? {
        where_message::Clause::And(l) => Ok(Where::And(list(l)?)),
        where_message::Clause::Or(l) => Ok(Where::Or(list(l)?)),
        where_message::Clause::Not(l) => {
            let mut children = list(l)?;
            match (children.pop(), children.is_empty()) {
                (Some(child), true) => Ok(child.negate()),
                (child, _) => Err(WireError::NotArity(children.len() + usize::from(child.is_some()))),
            }
        }
        where_message::Clause::Predicate(p) => Ok(Where::Predicate(Predicate {
            function: p.function,
            args: p
                .args
                .into_iter()
                .map(operand_from_message)
                .collect::<Result<_, _>>()?,
        })),
    }
}

fn operand_to_message(operand: &Operand) -> OperandMessage {
    let operand = match operand {
        Operand::Entry(name) => operand_message::Operand::Entry(name.clone()),
        Operand::RowKey => operand_message::Operand::RowKey(true),
        Operand::Literal(text) => operand_message::Operand::Literal(text.clone()),
    };
    OperandMessage { operand: Some(operand) }
}

fn operand_from_message(message: OperandMessage) -> Result<Operand, WireError> {
    match message.operand.ok_or(WireError::Missing("operand"))? {
        operand_message::Operand::Entry(name) => Ok(Operand::Entry(name)),
        operand_message::Operand::RowKey(_) => Ok(Operand::RowKey),
        operand_message::Operand::Literal(text) => Ok(Operand::Literal(text)),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn encode_response(response: &Response) -> Vec<u8> {
    ResponseMessage::from(response).encode_to_vec()
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, WireError> {
    Response::try_from(ResponseMessage::decode(bytes)?)
}

impl From<RequestKind> for RequestKindMessage {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Query => RequestKindMessage::Query,
            RequestKind::Replicate => RequestKindMessage::Replicate,
            RequestKind::Reflect => RequestKindMessage::Reflect,
        }
    }
}

impl From<RequestKindMessage> for RequestKind {
    fn from(kind: RequestKindMessage) -> Self {
        match kind {
            RequestKindMessage::Query => RequestKind::Query,
            RequestKindMessage::Replicate => RequestKind::Replicate,
            RequestKindMessage::Reflect => RequestKind::Reflect,
        }
    }
}

impl From<&Response> for ResponseMessage {
    fn from(response: &Response) -> Self {
        let (err, err_kind) = match &response.err {
            Some(e) => (e.message.clone(), e.kind.as_str().to_string()),
            None => (String::new(), String::new()),
        };
        ResponseMessage {
            kind: RequestKindMessage::from(response.kind) as i32,
            msg: response.msg.clone(),
            err,
            err_kind,
            path: response.path.as_ref().map(Address::to_string).unwrap_or_default(),
            index: response.index.as_ref().map(index_to_message),
            namespace: response.namespace.as_ref().map(namespace_to_message),
        }
    }
}

impl TryFrom<ResponseMessage> for Response {
    type Error = WireError;

    fn try_from(message: ResponseMessage) -> Result<Self, WireError> {
        let kind = RequestKindMessage::try_from(message.kind).map_err(|_| WireError::UnknownEnum {
            field: "response kind",
            value: message.kind,
        })?;
        let err = if message.err_kind.is_empty() && message.err.is_empty() {
            None
        } else {
            let kind = ErrorKind::parse(&message.err_kind)
                .ok_or_else(|| WireError::ErrorKind(message.err_kind.clone()))?;
            Some(ResponseError {
                kind,
                message: message.err,
            })
        };
        let path = if message.path.is_empty() {
            None
        } else {
            Some(Address::new(message.path)?)
        };
        Ok(Response {
            kind: kind.into(),
            msg: message.msg,
            err,
            path,
            index: message.index.map(|m| index_from_message(m).into_logged("response index")),
            namespace: message
                .namespace
                .map(|m| namespace_from_message(m).into_logged("response namespace")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_model::{Entry, Index, Namespace, PrivateKey, Row, Table};

    #[test]
    fn test_select_request_round_trip() {
        let query = SelectQuery::new("cars")
            .filter(Where::And(vec![
                Where::eq("driver", "Mr Blogs"),
                Where::predicate("str_eq", vec![Operand::RowKey, Operand::literal("car10")]).negate(),
                Where::Or(vec![]),
            ]))
            .limit(7);
        let request = Request::Query(query.into());
        assert_eq!(decode_request(&encode_request(&request)).unwrap(), request);
    }

    #[test]
    fn test_join_and_replicate_requests_round_trip() {
        let join = Request::Query(
            JoinQuery::new("cars")
                .row(JoinRow::new("car10").set("driver", "A").set("driver", "B"))
                .into(),
        );
        assert_eq!(decode_request(&encode_request(&join)).unwrap(), join);

        let key = PrivateKey::generate();
        let replicate = Request::Replicate(vec![
            Link::signed(Address::new("QmFirst").unwrap(), &[key]),
            Link::unsigned(Address::new("QmRoot").unwrap()),
        ]);
        assert_eq!(decode_request(&encode_request(&replicate)).unwrap(), replicate);
    }

    #[test]
    fn test_unknown_reflect_kind_is_rejected() {
        let message = RequestMessage {
            body: Some(request_message::Body::Reflect(ReflectMessage { kind: 42 })),
        };
        let err = decode_request(&message.encode_to_vec()).unwrap_err();
        assert!(matches!(err, WireError::UnknownEnum { value: 42, .. }));
        assert!(matches!(decode_request(&[]), Err(WireError::Missing("request"))));
    }

    #[test]
    fn test_not_needs_one_child() {
        let message = WhereMessage {
            clause: Some(where_message::Clause::Not(WhereListMessage { clauses: vec![] })),
        };
        assert!(matches!(where_from_message(message), Err(WireError::NotArity(0))));
    }

    #[test]
    fn test_response_round_trip() {
        let namespace = Namespace::single(
            "cars",
            Table::new().with_row("car10", Row::new().with_entry("driver", Entry::from_texts(["A"]))),
        );
        let response = Response::ok(RequestKind::Reflect, "ok")
            .with_path(Address::new("QmRoot").unwrap())
            .with_index(Index::new())
            .with_namespace(namespace);
        assert_eq!(decode_response(&encode_response(&response)).unwrap(), response);

        let failed = Response::error(RequestKind::Query, ErrorKind::Input, "table name is empty");
        assert_eq!(decode_response(&encode_response(&failed)).unwrap(), failed);
    }
}
