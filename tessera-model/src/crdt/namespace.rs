//! Namespace hierarchy: Namespace → Table → Row → Entry → Point

use super::Join;
use crate::crypto::{PrivateKey, PublicKey};
use crate::types::{Signature, SignatureSet};
use std::collections::BTreeMap;

/// An opaque text value with the signatures attached to it.
///
/// Points order by (text, signatures).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    text: String,
    signatures: SignatureSet,
}

impl Point {
    /// An unsigned point.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            signatures: SignatureSet::new(),
        }
    }

    pub fn with_signatures(
        text: impl Into<String>,
        signatures: impl IntoIterator<Item = Signature>,
    ) -> Self {
        Self {
            text: text.into(),
            signatures: initialized(signatures),
        }
    }

    /// A point signed over its text by each key.
    pub fn signed(text: impl Into<String>, keys: &[PrivateKey]) -> Self {
        let text = text.into();
        let signatures = keys.iter().map(|k| k.sign(text.as_bytes())).collect();
        Self { text, signatures }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// True iff some signature verifies against some key.
    pub fn is_verified_by_any(&self, keys: &[PublicKey]) -> bool {
        verified_by_any(self.text.as_bytes(), &self.signatures, keys)
    }

    fn merge_signatures(&mut self, other: &Point) {
        debug_assert_eq!(self.text, other.text);
        self.signatures.extend(other.signatures.iter().cloned());
    }
}

/// Drop uninitialized signatures; they never verify and do not encode.
pub(crate) fn initialized(signatures: impl IntoIterator<Item = Signature>) -> SignatureSet {
    signatures.into_iter().filter(|sig| !sig.is_uninitialized()).collect()
}

pub(crate) fn verified_by_any(message: &[u8], signatures: &SignatureSet, keys: &[PublicKey]) -> bool {
    signatures.iter().any(|sig| {
        keys.iter()
            .any(|key| matches!(key.verify(message, sig), Ok(true)))
    })
}

/// Set of points keyed by text. Same-text points merge their signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Entry {
    points: BTreeMap<String, Point>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry of unsigned points.
    pub fn from_texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        texts.into_iter().map(Point::new).collect()
    }

    pub fn add_point(&mut self, point: Point) {
        match self.points.get_mut(point.text()) {
            Some(existing) => existing.merge_signatures(&point),
            None => {
                self.points.insert(point.text.clone(), point);
            }
        }
    }

    pub fn with_point(mut self, point: Point) -> Self {
        self.add_point(point);
        self
    }

    pub fn get(&self, text: &str) -> Option<&Point> {
        self.points.get(text)
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

impl FromIterator<Point> for Entry {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        let mut entry = Entry::new();
        for point in iter {
            entry.add_point(point);
        }
        entry
    }
}

impl Join for Entry {
    fn join_mut(&mut self, other: &Self) {
        for point in other.points.values() {
            self.add_point(point.clone());
        }
    }

    fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Defines a CRDT map from child names to child CRDTs.
///
/// Empty children are never stored, so an empty map is the only empty value
/// and derived equality matches structural equality.
macro_rules! define_crdt_map {
    (
        $(#[$meta:meta])*
        $name:ident, $child:ty, $field:ident,
        add: $add:ident, with: $with:ident, get: $get:ident, iter: $iter:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name {
            $field: BTreeMap<String, $child>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            /// Join `child` into the slot for `name`. Empty children are ignored.
            pub fn $add(&mut self, name: impl Into<String>, child: $child) {
                if child.is_empty() {
                    return;
                }
                let name = name.into();
                match self.$field.get_mut(&name) {
                    Some(existing) => existing.join_mut(&child),
                    None => {
                        self.$field.insert(name, child);
                    }
                }
            }

            pub fn $with(mut self, name: impl Into<String>, child: $child) -> Self {
                self.$add(name, child);
                self
            }

            pub fn $get(&self, name: &str) -> Option<&$child> {
                self.$field.get(name)
            }

            /// Children in name order.
            pub fn $iter(&self) -> impl Iterator<Item = (&str, &$child)> {
                self.$field.iter().map(|(k, v)| (k.as_str(), v))
            }

            pub fn names(&self) -> impl Iterator<Item = &str> {
                self.$field.keys().map(String::as_str)
            }

            pub fn len(&self) -> usize {
                self.$field.len()
            }
        }

        impl<S: Into<String>> FromIterator<(S, $child)> for $name {
            fn from_iter<I: IntoIterator<Item = (S, $child)>>(iter: I) -> Self {
                let mut out = $name::new();
                for (name, child) in iter {
                    out.$add(name, child);
                }
                out
            }
        }

        impl Join for $name {
            fn join_mut(&mut self, other: &Self) {
                for (name, child) in &other.$field {
                    match self.$field.get_mut(name) {
                        Some(existing) => existing.join_mut(child),
                        None => {
                            self.$field.insert(name.clone(), child.clone());
                        }
                    }
                }
            }

            fn is_empty(&self) -> bool {
                self.$field.is_empty()
            }
        }
    };
}

define_crdt_map!(
    /// Map from entry name to [`Entry`].
    Row, Entry, entries,
    add: add_entry, with: with_entry, get: get_entry, iter: entries
);

define_crdt_map!(
    /// Map from row name to [`Row`].
    Table, Row, rows,
    add: add_row, with: with_row, get: get_row, iter: rows
);

define_crdt_map!(
    /// Map from table name to [`Table`]; the root of a namespace blob.
    Namespace, Table, tables,
    add: add_table, with: with_table, get: get_table, iter: tables
);

impl Namespace {
    /// A namespace holding exactly one table.
    pub fn single(name: impl Into<String>, table: Table) -> Self {
        Namespace::new().with_table(name, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::join_all;

    fn cars(driver: &str) -> Namespace {
        Namespace::single(
            "cars",
            Table::new().with_row("car10", Row::new().with_entry("driver", Entry::from_texts([driver]))),
        )
    }

    #[test]
    fn test_uninitialized_signatures_are_dropped() {
        let point = Point::with_signatures("x", [Signature::default(), Signature::from_bytes(vec![7])]);
        assert_eq!(point.signatures().len(), 1);
        assert!(point.signatures().iter().all(|sig| !sig.is_uninitialized()));
    }

    #[test]
    fn test_point_join_merges_signatures() {
        let a = Point::with_signatures("Mr Blogs", [Signature::from_bytes(vec![1])]);
        let b = Point::with_signatures("Mr Blogs", [Signature::from_bytes(vec![2])]);

        let entry = Entry::new().with_point(a).with_point(b);

        assert_eq!(entry.len(), 1);
        assert_eq!(entry.get("Mr Blogs").unwrap().signatures().len(), 2);
    }

    #[test]
    fn test_entry_orders_points_by_text() {
        let entry = Entry::from_texts(["b", "a", "c"]);
        let texts: Vec<&str> = entry.texts().collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_namespace_join_unions_leaves() {
        let joined = cars("Mr Blogs").join(&cars("Mrs Blogs"));
        let driver = joined
            .get_table("cars")
            .and_then(|t| t.get_row("car10"))
            .and_then(|r| r.get_entry("driver"))
            .unwrap();
        assert_eq!(driver.texts().collect::<Vec<_>>(), vec!["Mr Blogs", "Mrs Blogs"]);
    }

    #[test]
    fn test_empty_children_are_dropped() {
        let row = Row::new().with_entry("empty", Entry::new());
        assert!(row.is_empty());
        let table = Table::new().with_row("r", row);
        assert_eq!(table, Table::new());
    }

    #[test]
    fn test_join_laws_on_examples() {
        let a = cars("A");
        let b = cars("B").with_table("people", Table::new().with_row("p1", Row::new().with_entry("name", Entry::from_texts(["x"]))));
        let c = cars("C");

        assert_eq!(a.join(&b), b.join(&a));
        assert_eq!(a.join(&b.join(&c)), a.join(&b).join(&c));
        assert_eq!(a.join(&a), a);
        assert_eq!(a.join(&Namespace::new()), a);
        assert_eq!(join_all([a.clone(), b.clone(), c.clone()]), a.join(&b).join(&c));
    }

    #[test]
    fn test_signed_point_verifies() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let point = Point::signed("value", std::slice::from_ref(&key));
        assert!(point.is_verified_by_any(&[key.public_key()]));
        assert!(!point.is_verified_by_any(&[other.public_key()]));
        assert!(!point.is_verified_by_any(&[]));
    }
}
