//! Centralized cryptographic operations for Tessera.
//!
//! All Ed25519 signing and verification, content addressing and key hashing
//! go through this module.
//!
//! | Primitive   | Algorithm          | Purpose                              |
//! |-------------|--------------------|--------------------------------------|
//! | Address     | SHA2-256 multihash | Content addressing of CAS blobs      |
//! | Key hash    | SHA2-256 multihash | KeyStore lookup of public keys       |
//! | Signature   | Ed25519 (64 B)     | Link and point authenticity          |

use crate::types::{Address, Signature};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use multihash::Multihash;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Multicodec code for SHA2-256.
const SHA2_256: u64 = 0x12;

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("uninitialized signature")]
    Uninitialized,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,

    #[error("invalid Ed25519 private key")]
    InvalidPrivateKey,

    #[error("key text is not base58: {0}")]
    NotBase58(String),
}

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// Base58 text of the SHA2-256 multihash of `data`.
pub fn sha256_multihash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hash = Multihash::<64>::wrap(SHA2_256, &digest)
        .expect("a 32 byte digest always fits a 64 byte multihash");
    bs58::encode(hash.to_bytes()).into_string()
}

/// The content address a CAS gives to `data`.
pub fn content_address(data: &[u8]) -> Address {
    Address::from_base58_unchecked(sha256_multihash(data))
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Hash identifying a public key inside a [`crate::KeyStore`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHash(String);

impl KeyHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", self.0)
    }
}

impl From<&str> for KeyHash {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Ed25519 private key.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Secret bytes, wiped from memory when dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        sign(self, message)
    }

    /// Base58 text of the secret bytes, as written to key files.
    pub fn to_base58(&self) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(self.to_bytes().as_slice()).into_string())
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Zeroizing::new(
            bs58::decode(s.trim())
                .into_vec()
                .map_err(|e| CryptoError::NotBase58(e.to_string()))?,
        );
        let mut key_bytes = Zeroizing::new([0u8; 32]);
        if bytes.len() != key_bytes.len() {
            return Err(CryptoError::InvalidPrivateKey);
        }
        key_bytes.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&key_bytes))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(public = {})", self.public_key())
    }
}

/// Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Fails if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        let verifying_key =
            VerifyingKey::from_bytes(&array).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// SHA2-256 multihash of the key bytes, base58-encoded.
    pub fn hash(&self) -> KeyHash {
        KeyHash(sha256_multihash(&self.to_bytes()))
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool, CryptoError> {
        verify(self, message, signature)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| CryptoError::NotBase58(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

// ---------------------------------------------------------------------------
// Ed25519 signing and verification
// ---------------------------------------------------------------------------

/// Sign `message` with `key`.
pub fn sign(key: &PrivateKey, message: &[u8]) -> Signature {
    let sig = key.signing_key.sign(message);
    Signature::from_bytes(sig.to_bytes().to_vec())
}

/// Verify `signature` over `message`.
///
/// An uninitialized signature is an error; a signature of the wrong shape or
/// by another key is `Ok(false)`.
pub fn verify(key: &PublicKey, message: &[u8], signature: &Signature) -> Result<bool, CryptoError> {
    if signature.is_uninitialized() {
        return Err(CryptoError::Uninitialized);
    }
    let Ok(sig) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
        return Ok(false);
    };
    Ok(key.verifying_key.verify(message, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"QmAddress");
        assert_eq!(key.public_key().verify(b"QmAddress", &sig), Ok(true));
        assert_eq!(key.public_key().verify(b"QmOther", &sig), Ok(false));
    }

    #[test]
    fn test_attacker_key_does_not_verify() {
        let key = PrivateKey::generate();
        let attacker = PrivateKey::generate();
        let sig = key.sign(b"message");
        assert_eq!(attacker.public_key().verify(b"message", &sig), Ok(false));
    }

    #[test]
    fn test_uninitialized_signature_is_an_error() {
        let key = PrivateKey::generate();
        assert_eq!(
            key.public_key().verify(b"message", &Signature::default()),
            Err(CryptoError::Uninitialized)
        );
    }

    #[test]
    fn test_truncated_signature_is_false() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"message");
        let truncated = Signature::from_bytes(sig.as_bytes()[..10].to_vec());
        assert_eq!(key.public_key().verify(b"message", &truncated), Ok(false));
    }

    #[test]
    fn test_content_address_is_stable() {
        let a = content_address(b"blob");
        let b = content_address(b"blob");
        assert_eq!(a, b);
        assert_ne!(a, content_address(b"other blob"));
        // sha2-256 multihash prefix 0x12 0x20 renders as "Qm" in base58
        assert!(a.as_str().starts_with("Qm"));
    }

    #[test]
    fn test_key_text_round_trip() {
        let key = PrivateKey::generate();
        let parsed: PrivateKey = key.to_base58().parse().unwrap();
        assert_eq!(parsed.public_key(), key.public_key());

        let public: PublicKey = key.public_key().to_base58().parse().unwrap();
        assert_eq!(public, key.public_key());
        assert_eq!(public.hash(), key.public_key().hash());
    }

    #[test]
    fn test_bad_key_text() {
        assert_eq!("abc".parse::<PrivateKey>().err(), Some(CryptoError::InvalidPrivateKey));
        assert!(matches!("0".parse::<PublicKey>(), Err(CryptoError::NotBase58(_))));
    }
}
