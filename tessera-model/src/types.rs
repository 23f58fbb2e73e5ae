//! Strong types for CAS addresses and signatures
//!
//! Both have a base58 text form. Addresses are kept as text because that is
//! what peers exchange and what link signatures cover.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("address is not base58: {0}")]
    NotBase58(String),
}

/// Errors produced when parsing a [`Signature`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("empty signature text")]
    Empty,

    #[error("signature is not base58: {0}")]
    NotBase58(String),
}

/// Content address of an immutable CAS blob (base58 multihash text).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Parse and validate an address.
    pub fn new(text: impl Into<String>) -> Result<Self, AddressError> {
        let text = text.into();
        if text.is_empty() {
            return Err(AddressError::Empty);
        }
        bs58::decode(&text)
            .into_vec()
            .map_err(|e| AddressError::NotBase58(e.to_string()))?;
        Ok(Self(text))
    }

    /// For text this crate just base58-encoded itself.
    pub(crate) fn from_base58_unchecked(text: String) -> Self {
        debug_assert!(!text.is_empty());
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bytes that link signatures are computed over.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// First few characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        &self.0[..end]
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque signature bytes.
///
/// Ordered by byte compare. An empty signature is uninitialized and never
/// verifies.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Vec<u8>);

/// Sorted, de-duplicated signatures.
pub type SignatureSet = BTreeSet<Signature>;

impl Signature {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_uninitialized(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse base58 text. Empty text and non-base58 text are rejected.
    pub fn from_base58(text: &str) -> Result<Self, SignatureError> {
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|e| SignatureError::NotBase58(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SignatureError::Empty);
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_base58();
        let end = text.len().min(12);
        write!(f, "Signature({}..)", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert_eq!(Address::new(""), Err(AddressError::Empty));
        assert!(matches!(Address::new("not:base58"), Err(AddressError::NotBase58(_))));
        // 0, O, I and l are outside the base58 alphabet
        assert!(Address::new("0OIl").is_err());

        let addr: Address = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".parse().unwrap();
        assert_eq!(addr.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
        assert_eq!(addr.short(), "QmYwAPJzv5");
    }

    #[test]
    fn test_signature_text_round_trip() {
        let sig = Signature::from_bytes(vec![7u8; 64]);
        let text = sig.to_base58();
        assert_eq!(Signature::from_base58(&text).unwrap(), sig);
        assert_eq!(format!("{}", sig), text);
    }

    #[test]
    fn test_signature_rejects_empty_text() {
        assert_eq!(Signature::from_base58(""), Err(SignatureError::Empty));
        assert!(Signature::from_base58("0").is_err());
    }

    #[test]
    fn test_signature_order_is_bytewise() {
        let low = Signature::from_bytes(vec![1, 255]);
        let high = Signature::from_bytes(vec![2, 0]);
        assert!(low < high);
        assert!(Signature::default().is_uninitialized());
    }
}
