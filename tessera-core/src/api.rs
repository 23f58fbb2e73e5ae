//! Requests, responses and the commands that carry them to the core
//!
//! A [`Response`] always answers exactly one request. `msg` is `"error"`
//! exactly when `err` is set; successful responses carry a short status
//! message and whichever of `path`, `index` and `namespace` the request
//! produces.

use crate::{CoreError, RemoteNamespaceCore};
use std::fmt;
use tessera_model::{Address, ErrorKind, Index, Link, Namespace};
use tessera_query::Query;
use tokio::sync::oneshot;

/// `msg` of every failed response.
pub const ERROR_MSG: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Query,
    Replicate,
    Reflect,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Query => "query",
            RequestKind::Replicate => "replicate",
            RequestKind::Reflect => "reflect",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only views of the core's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflectKind {
    /// Address of the last index written by the pulse.
    HeadPath,
    /// The merged index held in memory.
    Index,
    /// Every namespace the index references, joined.
    DumpNamespace,
}

/// Scheduling precedence; lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    Join = 0,
    Reflect = 1,
    Select = 2,
    Replicate = 3,
}

impl Priority {
    pub const COUNT: usize = 4;

    pub const ALL: [Priority; Priority::COUNT] =
        [Priority::Join, Priority::Reflect, Priority::Select, Priority::Replicate];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query(Query),
    Replicate(Vec<Link>),
    Reflect(ReflectKind),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Query(_) => RequestKind::Query,
            Request::Replicate(_) => RequestKind::Replicate,
            Request::Reflect(_) => RequestKind::Reflect,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Request::Query(Query::Join(_)) => Priority::Join,
            Request::Query(Query::Select(_)) => Priority::Select,
            Request::Reflect(_) => Priority::Reflect,
            Request::Replicate(_) => Priority::Replicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: RequestKind,
    pub msg: String,
    pub err: Option<ResponseError>,
    pub path: Option<Address>,
    pub index: Option<Index>,
    pub namespace: Option<Namespace>,
}

impl Response {
    pub fn ok(kind: RequestKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            err: None,
            path: None,
            index: None,
            namespace: None,
        }
    }

    pub fn error(kind: RequestKind, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            err: Some(ResponseError {
                kind: error_kind,
                message: message.into(),
            }),
            ..Self::ok(kind, ERROR_MSG)
        }
    }

    pub fn from_error(kind: RequestKind, error: &CoreError) -> Self {
        Self::error(kind, error.kind(), error.to_string())
    }

    pub fn with_path(mut self, path: Address) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn is_error(&self) -> bool {
        self.err.is_some()
    }
}

/// Plain-text rendering, used when a client cannot take the binary form.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.err {
            Some(err) => write!(f, "{} {}: {err}", self.kind, self.msg)?,
            None => write!(f, "{}: {}", self.kind, self.msg)?,
        }
        if let Some(path) = &self.path {
            write!(f, "\npath {path}")?;
        }
        if let Some(index) = &self.index {
            for (table, link) in index.all_links() {
                write!(f, "\nlink {table} {link}")?;
            }
        }
        if let Some(namespace) = &self.namespace {
            for (table, t) in namespace.tables() {
                for (row, r) in t.rows() {
                    for (entry, e) in r.entries() {
                        let texts: Vec<&str> = e.texts().collect();
                        write!(f, "\nrow {table}/{row} {entry}={texts:?}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A request travelling to the core with its reply channel.
#[derive(Debug)]
pub struct Command {
    request: Request,
    reply: oneshot::Sender<Response>,
}

impl Command {
    pub fn new(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn priority(&self) -> Priority {
        self.request.priority()
    }

    /// Answer the caller. A caller that stopped waiting is not an error.
    pub fn respond(self, response: Response) {
        let _ = self.reply.send(response);
    }

    pub fn fail(self, error_kind: ErrorKind, message: impl Into<String>) {
        let kind = self.request.kind();
        self.respond(Response::error(kind, error_kind, message));
    }

    pub async fn run(self, core: &RemoteNamespaceCore) {
        let response = core.execute(&self.request).await;
        self.respond(response);
    }
}
