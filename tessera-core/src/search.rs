//! Searchers drive a load-traverse over the namespaces an index references
//!
//! The core asks a searcher which links to follow, loads the namespaces one
//! at a time and hands each outcome back. Returning
//! [`ControlFlow::Break`] ends the traversal before the next load.

use crate::CoreError;
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use tessera_model::{Address, Index, Join, Link, Namespace};
use tessera_query::{FunctionNamespace, SelectEvaluator, SelectQuery};

/// One step of a load-traverse.
#[derive(Debug)]
pub enum SearchResult {
    Namespace { address: Address, namespace: Namespace },
    NamespaceLoadFailure { address: Address, error: CoreError },
    /// The root index could not be read; no namespace was visited.
    IndexLoadFailure { error: CoreError },
}

pub trait Searcher: Send {
    /// Links to visit, in visiting order.
    fn reachable(&self, index: &Index) -> Vec<Link>;

    fn search(&mut self, result: SearchResult) -> Result<ControlFlow<()>, CoreError>;
}

/// A load failure seen during a traverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFailure {
    pub address: Option<Address>,
    pub message: String,
}

impl SearchFailure {
    fn record(failures: &mut Vec<SearchFailure>, result: SearchResult) {
        let failure = match result {
            SearchResult::Namespace { .. } => return,
            SearchResult::NamespaceLoadFailure { address, error } => {
                tracing::warn!(address = %address, error = %error, "Namespace load failed");
                SearchFailure {
                    address: Some(address),
                    message: error.to_string(),
                }
            }
            SearchResult::IndexLoadFailure { error } => {
                tracing::warn!(error = %error, "Index load failed");
                SearchFailure {
                    address: None,
                    message: error.to_string(),
                }
            }
        };
        failures.push(failure);
    }
}

/// Evaluates a SELECT over the namespaces linked from its table.
pub struct SelectSearcher<'a> {
    table: &'a str,
    eval: SelectEvaluator<'a>,
    failures: Vec<SearchFailure>,
}

impl<'a> SelectSearcher<'a> {
    pub fn new(query: &'a SelectQuery, functions: &'a FunctionNamespace) -> Self {
        Self {
            table: &query.table,
            eval: SelectEvaluator::new(query, functions),
            failures: Vec::new(),
        }
    }

    pub fn failures(&self) -> &[SearchFailure] {
        &self.failures
    }

    pub fn finish(self) -> Namespace {
        self.eval.finish()
    }
}

impl Searcher for SelectSearcher<'_> {
    fn reachable(&self, index: &Index) -> Vec<Link> {
        index.links(self.table).cloned().collect()
    }

    fn search(&mut self, result: SearchResult) -> Result<ControlFlow<()>, CoreError> {
        if let SearchResult::Namespace { namespace, .. } = &result {
            return Ok(if self.eval.feed(namespace)? {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            });
        }
        SearchFailure::record(&mut self.failures, result);
        Ok(ControlFlow::Continue(()))
    }
}

/// Joins every namespace the index links to.
#[derive(Default)]
pub struct DumpSearcher {
    namespace: Namespace,
    failures: Vec<SearchFailure>,
}

impl DumpSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> &[SearchFailure] {
        &self.failures
    }

    pub fn finish(self) -> Namespace {
        self.namespace
    }
}

impl Searcher for DumpSearcher {
    /// Each address once, even when several tables link to it.
    fn reachable(&self, index: &Index) -> Vec<Link> {
        let mut seen = BTreeSet::new();
        index
            .all_links()
            .filter(|(_, link)| seen.insert(link.address().clone()))
            .map(|(_, link)| link.clone())
            .collect()
    }

    fn search(&mut self, result: SearchResult) -> Result<ControlFlow<()>, CoreError> {
        match result {
            SearchResult::Namespace { namespace, .. } => self.namespace.join_mut(&namespace),
            other => SearchFailure::record(&mut self.failures, other),
        }
        Ok(ControlFlow::Continue(()))
    }
}
