//! Index: table name → set of signed links to namespace blobs

use super::namespace::{initialized, verified_by_any};
use super::Join;
use crate::crypto::{PrivateKey, PublicKey};
use crate::types::{Address, AddressError, Signature, SignatureError, SignatureSet};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkParseError {
    #[error("invalid link address: {0}")]
    Address(#[from] AddressError),

    #[error("invalid link signature: {0}")]
    Signature(#[from] SignatureError),
}

/// A CAS address together with the signatures vouching for it.
///
/// Links order by (address, signatures).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    address: Address,
    signatures: SignatureSet,
}

impl Link {
    pub fn unsigned(address: Address) -> Self {
        Self {
            address,
            signatures: SignatureSet::new(),
        }
    }

    pub fn with_signatures(address: Address, signatures: impl IntoIterator<Item = Signature>) -> Self {
        Self {
            address,
            signatures: initialized(signatures),
        }
    }

    /// Sign the address bytes once per key.
    pub fn signed(address: Address, keys: &[PrivateKey]) -> Self {
        let signatures = keys.iter().map(|k| k.sign(address.as_bytes())).collect();
        Self { address, signatures }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// True iff some signature verifies against some key. An empty key set
    /// never verifies.
    pub fn is_verified_by_any(&self, keys: &[PublicKey]) -> bool {
        verified_by_any(self.address.as_bytes(), &self.signatures, keys)
    }

    fn merge_signatures(&mut self, other: &Link) {
        self.signatures.extend(other.signatures.iter().cloned());
    }
}

/// `address[:signature]*`, every part base58.
impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address.as_str())?;
        for sig in &self.signatures {
            write!(f, ":{sig}")?;
        }
        Ok(())
    }
}

impl FromStr for Link {
    type Err = LinkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let address = Address::new(parts.next().unwrap_or_default())?;
        let signatures = parts
            .map(Signature::from_base58)
            .collect::<Result<SignatureSet, _>>()?;
        Ok(Self { address, signatures })
    }
}

/// Map from table name to the links holding that table's data.
///
/// Within a table, links are unique by address; adding a link that is
/// already present merges its signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Index {
    tables: BTreeMap<String, BTreeMap<Address, Link>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index with one link under one table.
    pub fn single(table: impl Into<String>, link: Link) -> Self {
        let mut index = Index::new();
        index.add_link(table, link);
        index
    }

    pub fn add_link(&mut self, table: impl Into<String>, link: Link) {
        let links = self.tables.entry(table.into()).or_default();
        match links.get_mut(link.address()) {
            Some(existing) => existing.merge_signatures(&link),
            None => {
                links.insert(link.address.clone(), link);
            }
        }
    }

    pub fn with_link(mut self, table: impl Into<String>, link: Link) -> Self {
        self.add_link(table, link);
        self
    }

    /// Links under `table` in address order.
    pub fn links<'a>(&'a self, table: &str) -> impl Iterator<Item = &'a Link> + 'a {
        self.tables.get(table).into_iter().flat_map(|links| links.values())
    }

    /// Every (table, link) pair in table order.
    pub fn all_links(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.tables
            .iter()
            .flat_map(|(table, links)| links.values().map(move |link| (table.as_str(), link)))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn link_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }
}

impl Join for Index {
    fn join_mut(&mut self, other: &Self) {
        for (table, links) in &other.tables {
            for link in links.values() {
                self.add_link(table.as_str(), link.clone());
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
