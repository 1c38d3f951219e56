use super::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ListResult, Result, Store, StoreError,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Default)]
struct MemoryData {
    values: HashMap<String, Vec<u8>>,
    /// Keys in insertion order, so listing is deterministic.
    keys: Vec<String>,
}

/// A store that keeps everything in process memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, MemoryData> {
        // Every mutation updates values and keys together before it can panic.
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.data().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().keys.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_with(
        &self,
        key: &str,
        value: Vec<u8>,
        _options: &CreateOptions,
    ) -> Result<()> {
        let mut data = self.data();
        if data.values.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_owned()));
        }
        data.values.insert(key.to_owned(), value);
        data.keys.push(key.to_owned());
        Ok(())
    }

    async fn get_with(&self, key: &str, _options: &GetOptions) -> Result<Vec<u8>> {
        self.data()
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::DoesNotExist(key.to_owned()))
    }

    async fn delete_with(&self, key: &str, _options: &DeleteOptions) -> Result<()> {
        let mut data = self.data();
        let idx = data
            .keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| StoreError::DoesNotExist(key.to_owned()))?;
        data.keys.remove(idx);
        data.values.remove(key);
        Ok(())
    }

    async fn list_with(&self, prefix: &str, _options: &ListOptions) -> Result<ListResult> {
        let keys = self
            .data()
            .keys
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(ListResult::new(keys))
    }

    async fn cleanup(&self) -> Result<()> {
        *self.data() = MemoryData::default();
        Ok(())
    }
}
