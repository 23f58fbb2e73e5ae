//! Error kinds shared across Tessera crates
//!
//! Each crate has its own error enums; `ErrorKind` is the coarse class a
//! caller uses to decide whether to retry, skip or give up.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid query, empty table name, unknown predicate, malformed payload.
    Input,
    /// Address not cached; fall through to the CAS.
    NotFound,
    /// CAS unreachable or subscription dropped. Retryable.
    TransientIo,
    /// Signature verification failure or rejected decoder entries.
    Integrity,
    /// Aborted because the system is closing.
    Shutdown,
    /// Anything else, e.g. a poisoned lock.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Shutdown => "shutdown",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(ErrorKind::Input),
            "not_found" => Some(ErrorKind::NotFound),
            "transient_io" => Some(ErrorKind::TransientIo),
            "integrity" => Some(ErrorKind::Integrity),
            "shutdown" => Some(ErrorKind::Shutdown),
            "internal" => Some(ErrorKind::Internal),
            _ => None,
        }
    }

    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientIo | ErrorKind::NotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
