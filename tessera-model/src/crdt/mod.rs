//! State-based CRDTs
//!
//! Every type here is a join-semilattice: `join` is commutative, associative
//! and idempotent, and the empty value is its identity. Values are kept
//! canonical at all times (sorted maps, no empty children), so derived
//! equality is structural equality and the wire encoding is byte-stable.

mod index;
mod namespace;

pub use index::{Index, Link, LinkParseError};
pub use namespace::{Entry, Namespace, Point, Row, Table};

/// Join-semilattice behaviour shared by all CRDT types.
pub trait Join: Clone + Default {
    /// Merge `other` into `self`, leaving the least upper bound in `self`.
    fn join_mut(&mut self, other: &Self);

    /// Least upper bound of `self` and `other` as a new value.
    fn join(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.join_mut(other);
        out
    }

    /// True for the identity element.
    fn is_empty(&self) -> bool;
}

/// Join every value in `values`, starting from empty.
pub fn join_all<T, I>(values: I) -> T
where
    T: Join,
    I: IntoIterator<Item = T>,
{
    values.into_iter().fold(T::default(), |mut acc, value| {
        acc.join_mut(&value);
        acc
    })
}
