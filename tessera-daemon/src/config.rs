//! Daemon configuration
//!
//! Read from a TOML file. Every field has a default, so an empty file runs a
//! throwaway in-memory peer:
//!
//! ```toml
//! peer_id = "alpha"
//! data_dir = "/var/lib/tessera"
//!
//! [core]
//! pulse_interval_ms = 5000
//! public_index = false
//!
//! [service]
//! queue_capacity = 64
//! query_limit = 1
//!
//! [replication]
//! interval_ms = 10000
//! topics = ["tessera/fleet"]
//!
//! [keys]
//! private_key_files = ["/etc/tessera/alpha.key"]
//! public_keys = ["9Xo..."]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_cache::StorageConfig;
use tessera_core::CoreOptions;
use tessera_model::{CryptoError, KeyStoreError};
use tessera_service::{ReplicatorOptions, ServiceOptions};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("bad key in {path}: {source}")]
    PrivateKey {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },

    #[error("bad public key {text:?}: {source}")]
    PublicKey {
        text: String,
        #[source]
        source: CryptoError,
    },

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}

impl ConfigError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk layout of a persistent peer.
///
/// - `identity.key` - base58 private key, used when no key files are configured
/// - `cache.redb` - HEAD, index and namespace caches
/// - `blobs.redb` - the peer's content-addressed blobs
#[derive(Debug, Clone)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn identity_key(&self) -> PathBuf {
        self.base.join("identity.key")
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig::File(self.base.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Name of this peer on the network.
    pub peer_id: String,
    /// Absent keeps blobs and caches in memory.
    pub data_dir: Option<PathBuf>,
    /// Entries per in-memory cache; ignored with a data dir.
    pub cache_capacity: usize,
    pub core: CoreSection,
    pub service: ServiceSection,
    pub replication: ReplicationSection,
    pub keys: KeysSection,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            peer_id: "tesserad".into(),
            data_dir: None,
            cache_capacity: 1024,
            core: CoreSection::default(),
            service: ServiceSection::default(),
            replication: ReplicationSection::default(),
            keys: KeysSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreSection {
    pub pulse_interval_ms: u64,
    pub public_index: bool,
    pub tube_capacity: usize,
    pub upload_parallelism: usize,
}

impl Default for CoreSection {
    fn default() -> Self {
        let defaults = CoreOptions::default();
        Self {
            pulse_interval_ms: millis(defaults.pulse_interval),
            public_index: defaults.is_public_index,
            tube_capacity: defaults.tube_capacity,
            upload_parallelism: defaults.upload_parallelism,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    pub queue_capacity: usize,
    /// 0 runs every queued command at once.
    pub query_limit: usize,
    pub wait_for_capacity: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        let defaults = ServiceOptions::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            query_limit: defaults.query_limit,
            wait_for_capacity: defaults.wait_for_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicationSection {
    pub interval_ms: u64,
    /// No topics disables the replicator.
    pub topics: Vec<String>,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        let defaults = ReplicatorOptions::default();
        Self {
            interval_ms: millis(defaults.interval),
            topics: defaults.topics,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeysSection {
    pub private_key_files: Vec<PathBuf>,
    /// Base58 public keys whose signatures are trusted.
    pub public_keys: Vec<String>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn data_dir(&self) -> Option<DataDir> {
        self.data_dir.as_ref().map(DataDir::new)
    }

    pub fn core_options(&self) -> CoreOptions {
        CoreOptions {
            pulse_interval: Duration::from_millis(self.core.pulse_interval_ms.max(1)),
            is_public_index: self.core.public_index,
            tube_capacity: self.core.tube_capacity.max(1),
            upload_parallelism: self.core.upload_parallelism.max(1),
            ..CoreOptions::default()
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            queue_capacity: self.service.queue_capacity.max(1),
            query_limit: self.service.query_limit,
            wait_for_capacity: self.service.wait_for_capacity,
        }
    }

    pub fn replicator_options(&self) -> ReplicatorOptions {
        ReplicatorOptions {
            topics: self.replication.topics.clone(),
            interval: Duration::from_millis(self.replication.interval_ms.max(1)),
        }
    }
}
