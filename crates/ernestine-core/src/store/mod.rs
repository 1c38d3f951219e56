pub mod filesystem;
pub mod memory;
pub mod s3;

#[cfg(test)]
mod local_s3;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object already exists. {0}")]
    AlreadyExists(String),
    #[error("Object does not exist. {0}")]
    DoesNotExist(String),
    #[error("Not authorized to access store. {0}")]
    NotAuthorized(String),
    #[error("Error connecting to store. {0}")]
    ConnectionError(String),
    #[error("Invalid store configuration. {0}")]
    InvalidConfig(String),
    #[error("I/O error in store. {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::DoesNotExist(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshot of the keys matching a prefix at the time of the call.
///
/// Ordering depends on the backend and must not be relied upon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResult {
    keys: Vec<String>,
}

impl ListResult {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// Number of matching keys; always equal to `keys().len()`.
    pub fn found(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<String> {
        self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Option structs never deny unknown fields: a backend honors the hints it
// understands and ignores everything else.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Content type recorded with the object, where the backend has a place for it.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetOptions {
    /// Expected value size, used to pre-size the read buffer.
    pub size_hint: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Page size for backends that enumerate keys in pages. Pages are always
    /// accumulated into one result.
    pub page_size: Option<usize>,
}

/// The storage contract shared by every backend.
///
/// `create` fails with [`StoreError::AlreadyExists`] for an existing key;
/// `get` and `delete` fail with [`StoreError::DoesNotExist`] for an absent one.
/// `cleanup` removes everything and leaves the store ready for new items; it
/// is a no-op when there is nothing to remove.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_with(&self, key: &str, value: Vec<u8>, options: &CreateOptions)
        -> Result<()>;
    async fn get_with(&self, key: &str, options: &GetOptions) -> Result<Vec<u8>>;
    async fn delete_with(&self, key: &str, options: &DeleteOptions) -> Result<()>;
    async fn list_with(&self, prefix: &str, options: &ListOptions) -> Result<ListResult>;
    async fn cleanup(&self) -> Result<()>;

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.create_with(key, value, &CreateOptions::default()).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.get_with(key, &GetOptions::default()).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_with(key, &DeleteOptions::default()).await
    }

    async fn list(&self, prefix: &str) -> Result<ListResult> {
        self.list_with(prefix, &ListOptions::default()).await
    }
}
