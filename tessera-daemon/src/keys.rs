//! Key files
//!
//! A key file holds one base58 private key. Its text only ever lives in
//! zeroizing buffers.

use crate::config::{ConfigError, DaemonConfig};
use std::fs;
use std::io::Write;
use std::path::Path;
use tessera_model::{KeyStore, PrivateKey, PublicKey};
use zeroize::Zeroizing;

pub fn read_private_key(path: &Path) -> Result<PrivateKey, ConfigError> {
    let text = Zeroizing::new(fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?);
    text.parse().map_err(|source| ConfigError::PrivateKey {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `key` to `path`, readable by the owner only.
pub fn write_private_key(path: &Path, key: &PrivateKey) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }
    let text = key.to_base58();
    let mut file = fs::File::create(path).map_err(|e| ConfigError::io(path, e))?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|e| ConfigError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| ConfigError::io(path, e))?;
    }
    Ok(())
}

/// Load `path`, or generate a key and save it there.
/// Returns (key, is_new).
pub fn load_or_generate(path: &Path) -> Result<(PrivateKey, bool), ConfigError> {
    if path.exists() {
        return Ok((read_private_key(path)?, false));
    }
    let key = PrivateKey::generate();
    write_private_key(path, &key)?;
    Ok((key, true))
}

/// Signing keys come from the configured files. Without any, a persistent
/// peer uses its identity key and an in-memory peer a fresh one.
pub fn build_key_store(config: &DaemonConfig) -> Result<KeyStore, ConfigError> {
    let keys = KeyStore::new();

    for path in &config.keys.private_key_files {
        keys.put_private_key(read_private_key(path)?)?;
    }

    if config.keys.private_key_files.is_empty() {
        let key = match config.data_dir() {
            Some(dir) => {
                let path = dir.identity_key();
                let (key, is_new) = load_or_generate(&path)?;
                if is_new {
                    tracing::info!(path = %path.display(), "Generated identity key");
                }
                key
            }
            None => {
                tracing::warn!("No key configured, signing with a throwaway key");
                PrivateKey::generate()
            }
        };
        keys.put_private_key(key)?;
    }

    for text in &config.keys.public_keys {
        let key: PublicKey = text.parse().map_err(|source| ConfigError::PublicKey {
            text: text.clone(),
            source,
        })?;
        keys.put_public_key(key)?;
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_identity_key_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.key");

        let (first, is_new) = load_or_generate(&path).unwrap();
        assert!(is_new);
        let (second, is_new) = load_or_generate(&path).unwrap();
        assert!(!is_new);
        assert_eq!(first.public_key(), second.public_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_configured_keys_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let signer = PrivateKey::generate();
        let key_file = dir.path().join("signer.key");
        write_private_key(&key_file, &signer).unwrap();
        let friend = PrivateKey::generate().public_key();

        let mut config = DaemonConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        config.keys.private_key_files = vec![key_file];
        config.keys.public_keys = vec![friend.to_string()];

        let keys = build_key_store(&config).unwrap();
        let private = keys.get_all_private_keys().unwrap();
        assert_eq!(private.len(), 1);
        assert_eq!(private[0].public_key(), signer.public_key());
        assert!(keys.get_public_key(&friend.hash()).is_ok());
        // Configured keys replace the identity key.
        assert!(!dir.path().join("identity.key").exists());
    }

    #[test]
    fn test_in_memory_peer_gets_a_key() {
        let keys = build_key_store(&DaemonConfig::default()).unwrap();
        assert_eq!(keys.get_all_private_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_key_text_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, "not a key 0OIl").unwrap();
        assert!(matches!(
            read_private_key(&path),
            Err(ConfigError::PrivateKey { .. })
        ));
        assert!(matches!(
            read_private_key(&PathBuf::from("/nonexistent/key")),
            Err(ConfigError::Io { .. })
        ));
    }
}
