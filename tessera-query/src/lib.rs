//! Tessera Query
//!
//! Parsed query values (SELECT and JOIN), their validation, and evaluation of
//! where clauses against namespace rows.

mod error;
pub mod eval;
pub mod function;
mod query;

pub use error::QueryError;
pub use eval::{matches, SelectEvaluator};
pub use function::{FunctionNamespace, PredicateFunction};
pub use query::{JoinQuery, JoinRow, Operand, Predicate, Query, SelectQuery, Where};
