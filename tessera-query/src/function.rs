//! FunctionNamespace - predicate functions callable from where clauses
//!
//! Every operand resolves to a set of strings before the call: a literal to
//! itself, `@key` to the row key, `@entry` to the entry's point texts (empty
//! when the row lacks the entry).

use crate::query::{Operand, Predicate};
use crate::QueryError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolved values of one operand.
pub type Values<'a> = Vec<&'a str>;

pub trait PredicateFunction: Send + Sync {
    /// Check arity and literal arguments before any row is evaluated.
    fn validate(&self, args: &[Operand]) -> Result<(), String>;

    fn call(&self, args: &[Values<'_>]) -> bool;
}

#[derive(Clone, Default)]
pub struct FunctionNamespace {
    functions: HashMap<String, Arc<dyn PredicateFunction>>,
}

impl std::fmt::Debug for FunctionNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_tuple("FunctionNamespace").field(&names).finish()
    }
}

impl FunctionNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// `str_eq`, `str_neq`, `str_empty` and `str_regexp`.
    pub fn standard() -> Self {
        let mut ns = Self::new();
        ns.register("str_eq", StrEq);
        ns.register("str_neq", StrNeq);
        ns.register("str_empty", StrEmpty);
        ns.register("str_regexp", StrRegexp::default());
        ns
    }

    pub fn register(&mut self, name: impl Into<String>, function: impl PredicateFunction + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn validate(&self, predicate: &Predicate) -> Result<(), QueryError> {
        let function = self.lookup(&predicate.function)?;
        function
            .validate(&predicate.args)
            .map_err(|reason| QueryError::BadArguments {
                function: predicate.function.clone(),
                reason,
            })
    }

    pub fn call(&self, name: &str, args: &[Values<'_>]) -> Result<bool, QueryError> {
        Ok(self.lookup(name)?.call(args))
    }

    fn lookup(&self, name: &str) -> Result<&Arc<dyn PredicateFunction>, QueryError> {
        self.functions
            .get(name)
            .ok_or_else(|| QueryError::UnknownFunction(name.to_string()))
    }
}

fn require_args(args: &[Operand], min: usize) -> Result<(), String> {
    if args.len() < min {
        return Err(format!("expected at least {min} arguments, got {}", args.len()));
    }
    Ok(())
}

/// Some value is present in every operand.
struct StrEq;

impl PredicateFunction for StrEq {
    fn validate(&self, args: &[Operand]) -> Result<(), String> {
        require_args(args, 2)
    }

    fn call(&self, args: &[Values<'_>]) -> bool {
        let Some((first, rest)) = args.split_first() else {
            return false;
        };
        first
            .iter()
            .any(|candidate| rest.iter().all(|values| values.contains(candidate)))
    }
}

struct StrNeq;

impl PredicateFunction for StrNeq {
    fn validate(&self, args: &[Operand]) -> Result<(), String> {
        require_args(args, 2)
    }

    fn call(&self, args: &[Values<'_>]) -> bool {
        !StrEq.call(args)
    }
}

/// Every operand is missing or holds only empty text.
struct StrEmpty;

impl PredicateFunction for StrEmpty {
    fn validate(&self, args: &[Operand]) -> Result<(), String> {
        require_args(args, 1)
    }

    fn call(&self, args: &[Values<'_>]) -> bool {
        args.iter().all(|values| values.iter().all(|v| v.is_empty()))
    }
}

/// Compiled patterns kept by one `str_regexp` instance.
const MAX_COMPILED_PATTERNS: usize = 64;

/// `str_regexp("pattern", operands...)`: every operand has a matching value.
#[derive(Default)]
struct StrRegexp {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl StrRegexp {
    fn regex(&self, pattern: &str) -> Option<Regex> {
        let mut compiled = self.compiled.lock().ok()?;
        if let Some(regex) = compiled.get(pattern) {
            return Some(regex.clone());
        }
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Pattern does not compile");
                return None;
            }
        };
        if compiled.len() >= MAX_COMPILED_PATTERNS {
            compiled.clear();
        }
        compiled.insert(pattern.to_string(), regex.clone());
        Some(regex)
    }

    #[cfg(test)]
    fn compiled_count(&self) -> usize {
        self.compiled.lock().map_or(0, |compiled| compiled.len())
    }
}

impl PredicateFunction for StrRegexp {
    fn validate(&self, args: &[Operand]) -> Result<(), String> {
        require_args(args, 2)?;
        match &args[0] {
            Operand::Literal(pattern) => Regex::new(pattern).map(|_| ()).map_err(|e| e.to_string()),
            other => Err(format!("pattern must be a literal, got {other}")),
        }
    }

    fn call(&self, args: &[Values<'_>]) -> bool {
        let Some((pattern, rest)) = args.split_first() else {
            return false;
        };
        let Some(regex) = pattern.first().and_then(|pattern| self.regex(pattern)) else {
            return false;
        };
        rest.iter()
            .all(|values| values.iter().any(|text| regex.is_match(text)))
    }
}
