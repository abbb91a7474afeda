//! Configuration for the ledger store

use crate::{memory::MemoryStore, storage::RocksStore, store::LedgerStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Which [`LedgerStore`] implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local maps; state is lost on exit
    Memory,
    /// RocksDB under `data_dir`
    RocksDb,
}

/// Ledger storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selection
    pub backend: StorageBackend,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data/cashback"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl StorageConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StorageConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse storage config: {}", e)))?;
        Ok(config)
    }

    /// Open the configured store
    pub fn open_store(&self) -> crate::Result<Arc<dyn LedgerStore>> {
        match self.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory ledger store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StorageBackend::RocksDb => Ok(Arc::new(RocksStore::open(self)?)),
        }
    }
}
