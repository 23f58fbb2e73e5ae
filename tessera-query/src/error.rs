use tessera_model::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("table name is empty")]
    EmptyTable,

    #[error("select limit must be greater than zero")]
    ZeroLimit,

    #[error("join has no rows")]
    NoRows,

    #[error("join row has an empty key")]
    EmptyRowKey,

    #[error("join row {0} has an empty entry name")]
    EmptyEntryName(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("bad arguments to {function}: {reason}")]
    BadArguments { function: String, reason: String },

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}
