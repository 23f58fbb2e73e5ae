//! Row evaluation
//!
//! A where clause is folded bottom-up with an explicit frame stack: visiting
//! a node pushes a combine frame followed by its children, and each combine
//! frame pops its children's results from the value stack.

use crate::function::{FunctionNamespace, Values};
use crate::query::{Operand, Predicate, SelectQuery, Where};
use crate::QueryError;
use tessera_model::{Join, Namespace, Row, Table};

enum Frame<'q> {
    Visit(&'q Where),
    All(usize),
    Any(usize),
    Not,
}

fn resolve<'r>(operand: &'r Operand, key: &'r str, row: &'r Row) -> Values<'r> {
    match operand {
        Operand::Literal(text) => vec![text.as_str()],
        Operand::RowKey => vec![key],
        Operand::Entry(name) => row
            .get_entry(name)
            .map(|entry| entry.texts().collect())
            .unwrap_or_default(),
    }
}

fn call_predicate(
    predicate: &Predicate,
    key: &str,
    row: &Row,
    functions: &FunctionNamespace,
) -> Result<bool, QueryError> {
    let args: Vec<Values<'_>> = predicate.args.iter().map(|arg| resolve(arg, key, row)).collect();
    functions.call(&predicate.function, &args)
}

fn pop_results(values: &mut Vec<bool>, count: usize) -> std::vec::Drain<'_, bool> {
    let Some(start) = values.len().checked_sub(count) else {
        panic!("where-clause value stack underflow: need {count}, have {}", values.len());
    };
    values.drain(start..)
}

/// Evaluate `clause` against one row.
pub fn matches(
    clause: &Where,
    key: &str,
    row: &Row,
    functions: &FunctionNamespace,
) -> Result<bool, QueryError> {
    let mut frames = vec![Frame::Visit(clause)];
    let mut values: Vec<bool> = Vec::new();

    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Visit(Where::Predicate(p)) => values.push(call_predicate(p, key, row, functions)?),
            Frame::Visit(Where::Not(child)) => {
                frames.push(Frame::Not);
                frames.push(Frame::Visit(child));
            }
            Frame::Visit(Where::And(children)) => {
                frames.push(Frame::All(children.len()));
                frames.extend(children.iter().rev().map(Frame::Visit));
            }
            Frame::Visit(Where::Or(children)) => {
                frames.push(Frame::Any(children.len()));
                frames.extend(children.iter().rev().map(Frame::Visit));
            }
            Frame::All(n) => {
                let result = pop_results(&mut values, n).fold(true, |acc, v| acc && v);
                values.push(result);
            }
            Frame::Any(n) => {
                let result = pop_results(&mut values, n).fold(false, |acc, v| acc || v);
                values.push(result);
            }
            Frame::Not => {
                let result = pop_results(&mut values, 1).fold(true, |_, v| !v);
                values.push(result);
            }
        }
    }

    match values.as_slice() {
        [result] => Ok(*result),
        other => panic!("where-clause fold left {} values", other.len()),
    }
}

/// Incremental SELECT over a stream of namespaces.
///
/// Matching rows from the query's table are joined into the result until
/// `limit` distinct rows have been collected.
pub struct SelectEvaluator<'a> {
    query: &'a SelectQuery,
    functions: &'a FunctionNamespace,
    result: Table,
}

impl<'a> SelectEvaluator<'a> {
    pub fn new(query: &'a SelectQuery, functions: &'a FunctionNamespace) -> Self {
        Self {
            query,
            functions,
            result: Table::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.result.len() >= self.query.limit as usize
    }

    /// Feed one namespace. Returns whether more input is wanted.
    pub fn feed(&mut self, namespace: &Namespace) -> Result<bool, QueryError> {
        let Some(table) = namespace.get_table(&self.query.table) else {
            return Ok(!self.is_full());
        };
        for (key, row) in table.rows() {
            let known = self.result.get_row(key).is_some();
            if !known && self.is_full() {
                continue;
            }
            let selected = match &self.query.where_clause {
                Some(clause) => matches(clause, key, row, self.functions)?,
                None => true,
            };
            if selected {
                self.result.add_row(key, row.clone());
            }
        }
        tracing::trace!(table = %self.query.table, rows = self.result.len(), "Fed namespace");
        Ok(!self.is_full())
    }

    /// The selected rows as a single-table namespace.
    pub fn finish(self) -> Namespace {
        if self.result.is_empty() {
            return Namespace::new();
        }
        Namespace::single(self.query.table.clone(), self.result)
    }
}
