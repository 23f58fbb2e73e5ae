//! Query values
//!
//! Queries arrive already parsed; this module only holds their shape,
//! checks them and renders them back to text for logs and error responses.

use crate::function::FunctionNamespace;
use crate::QueryError;
use std::collections::BTreeMap;
use std::fmt;
use tessera_model::{Entry, Point, PrivateKey, Row, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Select(SelectQuery),
    Join(JoinQuery),
}

impl Query {
    pub fn table(&self) -> &str {
        match self {
            Query::Select(q) => &q.table,
            Query::Join(q) => &q.table,
        }
    }

    pub fn validate(&self, functions: &FunctionNamespace) -> Result<(), QueryError> {
        match self {
            Query::Select(q) => q.validate(functions),
            Query::Join(q) => q.validate(),
        }
    }
}

impl From<SelectQuery> for Query {
    fn from(q: SelectQuery) -> Self {
        Query::Select(q)
    }
}

impl From<JoinQuery> for Query {
    fn from(q: JoinQuery) -> Self {
        Query::Join(q)
    }
}

/// `select <table> [where <clause>] limit <n>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub where_clause: Option<Where>,
    pub limit: u32,
}

impl SelectQuery {
    /// Select every row of `table`, one row at most until `limit` is set.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
            limit: 1,
        }
    }

    pub fn filter(mut self, clause: Where) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self, functions: &FunctionNamespace) -> Result<(), QueryError> {
        if self.table.is_empty() {
            return Err(QueryError::EmptyTable);
        }
        if self.limit == 0 {
            return Err(QueryError::ZeroLimit);
        }
        if let Some(clause) = &self.where_clause {
            for predicate in clause.predicates() {
                functions.validate(predicate)?;
            }
        }
        Ok(())
    }
}

/// Where-clause tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Where {
    /// True when every child is true; empty is true.
    And(Vec<Where>),
    /// True when any child is true; empty is false.
    Or(Vec<Where>),
    Not(Box<Where>),
    Predicate(Predicate),
}

impl Where {
    pub fn predicate(function: impl Into<String>, args: Vec<Operand>) -> Self {
        Where::Predicate(Predicate {
            function: function.into(),
            args,
        })
    }

    /// `str_eq(@entry, "value")`
    pub fn eq(entry: impl Into<String>, value: impl Into<String>) -> Self {
        Where::predicate("str_eq", vec![Operand::entry(entry), Operand::literal(value)])
    }

    pub fn negate(self) -> Self {
        Where::Not(Box::new(self))
    }

    /// Every predicate in the tree, depth first.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Where::And(children) | Where::Or(children) => stack.extend(children.iter().rev()),
                Where::Not(child) => stack.push(child),
                Where::Predicate(p) => found.push(p),
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub function: String,
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Texts of the named entry in the row under test.
    Entry(String),
    /// The key of the row under test.
    RowKey,
    Literal(String),
}

impl Operand {
    pub fn entry(name: impl Into<String>) -> Self {
        Operand::Entry(name.into())
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Operand::Literal(text.into())
    }
}

/// `join <table> rows (...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinQuery {
    pub table: String,
    pub rows: Vec<JoinRow>,
}

impl JoinQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, row: JoinRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.table.is_empty() {
            return Err(QueryError::EmptyTable);
        }
        if self.rows.is_empty() {
            return Err(QueryError::NoRows);
        }
        for row in &self.rows {
            if row.key.is_empty() {
                return Err(QueryError::EmptyRowKey);
            }
            if row.entries.keys().any(String::is_empty) {
                return Err(QueryError::EmptyEntryName(row.key.clone()));
            }
        }
        Ok(())
    }

    /// The table this join writes, with every point signed by each key.
    pub fn to_table(&self, keys: &[PrivateKey]) -> Table {
        self.rows
            .iter()
            .map(|row| {
                let entries = row.entries.iter().map(|(name, values)| {
                    let entry: Entry = values.iter().map(|v| Point::signed(v.as_str(), keys)).collect();
                    (name.as_str(), entry)
                });
                (row.key.as_str(), entries.collect::<Row>())
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRow {
    pub key: String,
    /// Entry name → values.
    pub entries: BTreeMap<String, Vec<String>>,
}

impl JoinRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn set(mut self, entry: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.entry(entry.into()).or_default().push(value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Entry(name) => write!(f, "@{name}"),
            Operand::RowKey => f.write_str("@key"),
            Operand::Literal(text) => write_quoted(f, text),
        }
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, children) = match self {
            Where::And(children) => ("and", children),
            Where::Or(children) => ("or", children),
            Where::Not(child) => return write!(f, "not({child})"),
            Where::Predicate(p) => {
                write!(f, "{}(", p.function)?;
                for (i, arg) in p.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                return f.write_str(")");
            }
        };
        write!(f, "{op}(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Select(q) => {
                write!(f, "select {}", q.table)?;
                if let Some(clause) = &q.where_clause {
                    write!(f, " where {clause}")?;
                }
                write!(f, " limit {}", q.limit)
            }
            Query::Join(q) => {
                write!(f, "join {} rows (", q.table)?;
                for (i, row) in q.rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "(@key=")?;
                    write_quoted(f, &row.key)?;
                    for (name, values) in &row.entries {
                        for value in values {
                            write!(f, ", {name}=")?;
                            write_quoted(f, value)?;
                        }
                    }
                    f.write_str(")")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_model::Join;

    #[test]
    fn test_select_validation() {
        let functions = FunctionNamespace::standard();
        assert_eq!(SelectQuery::new("").validate(&functions), Err(QueryError::EmptyTable));
        assert_eq!(SelectQuery::new("cars").limit(0).validate(&functions), Err(QueryError::ZeroLimit));
        assert_eq!(
            SelectQuery::new("cars")
                .filter(Where::predicate("str_shout", vec![Operand::RowKey]))
                .validate(&functions),
            Err(QueryError::UnknownFunction("str_shout".into()))
        );
        assert!(SelectQuery::new("cars").filter(Where::eq("driver", "x")).validate(&functions).is_ok());
    }

    #[test]
    fn test_join_validation() {
        assert_eq!(JoinQuery::new("cars").validate(), Err(QueryError::NoRows));
        assert_eq!(JoinQuery::new("").row(JoinRow::new("r")).validate(), Err(QueryError::EmptyTable));
        assert_eq!(JoinQuery::new("cars").row(JoinRow::new("")).validate(), Err(QueryError::EmptyRowKey));
        assert!(matches!(
            JoinQuery::new("cars").row(JoinRow::new("r").set("", "x")).validate(),
            Err(QueryError::EmptyEntryName(_))
        ));
    }

    #[test]
    fn test_join_to_table_signs_points() {
        let key = PrivateKey::generate();
        let query = JoinQuery::new("cars")
            .row(JoinRow::new("car10").set("driver", "Mr Blogs"))
            .row(JoinRow::new("car10").set("colour", "red"));

        let table = query.to_table(std::slice::from_ref(&key));
        let row = table.get_row("car10").unwrap();
        let point = row.get_entry("driver").and_then(|e| e.get("Mr Blogs")).unwrap();
        assert!(point.is_verified_by_any(&[key.public_key()]));
        assert!(row.get_entry("colour").is_some());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_rendering() {
        let query: Query = SelectQuery::new("cars")
            .filter(Where::Or(vec![Where::eq("driver", "Mr \"B\""), Where::eq("driver", "x").negate()]))
            .limit(3)
            .into();
        assert_eq!(
            query.to_string(),
            r#"select cars where or(str_eq(@driver, "Mr \"B\""), not(str_eq(@driver, "x"))) limit 3"#
        );

        let join: Query = JoinQuery::new("cars").row(JoinRow::new("car10").set("driver", "A")).into();
        assert_eq!(join.to_string(), r#"join cars rows ((@key="car10", driver="A"))"#);
    }
}
