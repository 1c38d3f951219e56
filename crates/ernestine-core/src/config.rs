use crate::store::{
    filesystem::FileSystemStore,
    memory::MemoryStore,
    s3::{S3Config, S3Store},
    Result, Store,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Selects and configures one backend. Fields a backend does not recognize
/// are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Filesystem { path: PathBuf },
    S3(S3Config),
}

impl StoreConfig {
    pub fn driver(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Filesystem { .. } => "filesystem",
            StoreConfig::S3(_) => "s3",
        }
    }

    /// Builds the configured store, creating its directory or bucket if needed.
    pub async fn open(self) -> Result<Box<dyn Store>> {
        let driver = self.driver();
        let store: Box<dyn Store> = match self {
            StoreConfig::Memory => Box::new(MemoryStore::new()),
            StoreConfig::Filesystem { path } => Box::new(FileSystemStore::new(path)?),
            StoreConfig::S3(config) => Box::new(S3Store::connect(config).await?),
        };
        tracing::info!(driver, "Opened store");
        Ok(store)
    }
}
