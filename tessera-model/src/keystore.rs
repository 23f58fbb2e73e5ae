//! KeyStore - the peer's private and public keys
//!
//! Keys are small, so one mutex guards everything. Callers always receive
//! clones; the store keeps ownership of what it holds.

use crate::crypto::{KeyHash, PrivateKey, PublicKey};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyStoreError {
    #[error("private key for public key {0} already stored")]
    DuplicatePrivateKey(KeyHash),

    #[error("public key {0} already stored")]
    DuplicatePublicKey(KeyHash),

    #[error("no key with hash {0}")]
    NotFound(KeyHash),

    #[error("key store lock poisoned")]
    LockPoisoned,
}

/// Public keys and their hashes are parallel sequences.
#[derive(Default)]
struct KeyRing {
    private_keys: Vec<PrivateKey>,
    public_keys: Vec<PublicKey>,
    hashes: Vec<KeyHash>,
}

impl KeyRing {
    fn position_of_public(&self, key: &PublicKey) -> Option<usize> {
        self.public_keys.iter().position(|k| k == key)
    }

    fn push_public(&mut self, key: PublicKey) {
        self.hashes.push(key.hash());
        self.public_keys.push(key);
    }
}

#[derive(Default)]
pub struct KeyStore {
    ring: Mutex<KeyRing>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a private key and, if missing, its public key.
    ///
    /// Fails if a stored private key already has the same public key.
    pub fn put_private_key(&self, key: PrivateKey) -> Result<(), KeyStoreError> {
        let mut ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        let public = key.public_key();

        if ring.private_keys.iter().any(|k| k.public_key() == public) {
            return Err(KeyStoreError::DuplicatePrivateKey(public.hash()));
        }

        ring.private_keys.push(key);
        if ring.position_of_public(&public).is_none() {
            ring.push_public(public);
        }
        Ok(())
    }

    /// Store a public key. Fails if the key or its hash is already present.
    pub fn put_public_key(&self, key: PublicKey) -> Result<(), KeyStoreError> {
        let mut ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        let hash = key.hash();

        if ring.position_of_public(&key).is_some() || ring.hashes.contains(&hash) {
            return Err(KeyStoreError::DuplicatePublicKey(hash));
        }

        ring.push_public(key);
        Ok(())
    }

    pub fn get_private_key(&self, hash: &KeyHash) -> Result<PrivateKey, KeyStoreError> {
        let ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        ring.private_keys
            .iter()
            .find(|k| &k.public_key().hash() == hash)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(hash.clone()))
    }

    pub fn get_public_key(&self, hash: &KeyHash) -> Result<PublicKey, KeyStoreError> {
        let ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        ring.hashes
            .iter()
            .position(|h| h == hash)
            .map(|i| ring.public_keys[i])
            .ok_or_else(|| KeyStoreError::NotFound(hash.clone()))
    }

    pub fn get_all_public_keys(&self) -> Result<Vec<PublicKey>, KeyStoreError> {
        let ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        Ok(ring.public_keys.clone())
    }

    pub fn get_all_private_keys(&self) -> Result<Vec<PrivateKey>, KeyStoreError> {
        let ring = self.ring.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        Ok(ring.private_keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_adds_public_key() {
        let store = KeyStore::new();
        let key = PrivateKey::generate();
        let hash = key.public_key().hash();

        store.put_private_key(key.clone()).unwrap();

        assert_eq!(store.get_public_key(&hash).unwrap(), key.public_key());
        assert_eq!(store.get_private_key(&hash).unwrap().public_key(), key.public_key());
        assert_eq!(store.get_all_public_keys().unwrap().len(), 1);
        assert_eq!(store.get_all_private_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_private_key_rejected() {
        let store = KeyStore::new();
        let key = PrivateKey::generate();
        store.put_private_key(key.clone()).unwrap();

        let err = store.put_private_key(key.clone()).unwrap_err();
        assert_eq!(err, KeyStoreError::DuplicatePrivateKey(key.public_key().hash()));
        assert_eq!(store.get_all_private_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_private_key_after_public_key_does_not_duplicate_public() {
        let store = KeyStore::new();
        let key = PrivateKey::generate();
        store.put_public_key(key.public_key()).unwrap();
        store.put_private_key(key).unwrap();

        assert_eq!(store.get_all_public_keys().unwrap().len(), 1);
        assert_eq!(store.get_all_private_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_public_key_rejected() {
        let store = KeyStore::new();
        let key = PrivateKey::generate().public_key();
        store.put_public_key(key).unwrap();
        assert_eq!(
            store.put_public_key(key),
            Err(KeyStoreError::DuplicatePublicKey(key.hash()))
        );
    }

    #[test]
    fn test_missing_key() {
        let store = KeyStore::new();
        let hash = PrivateKey::generate().public_key().hash();
        assert_eq!(store.get_public_key(&hash), Err(KeyStoreError::NotFound(hash.clone())));
        assert!(matches!(store.get_private_key(&hash), Err(KeyStoreError::NotFound(_))));
    }

    #[test]
    fn test_public_only_key_has_no_private_key() {
        let store = KeyStore::new();
        let key = PrivateKey::generate().public_key();
        store.put_public_key(key).unwrap();
        assert!(store.get_private_key(&key.hash()).is_err());
        assert!(store.get_all_private_keys().unwrap().is_empty());
    }
}
