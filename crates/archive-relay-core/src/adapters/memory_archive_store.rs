//! # In-Memory Archive Store
//!
//! Keeps uploaded archives in memory. Used by tests and local runs.

use crate::archiver::ArchiveStream;
use crate::storage::{ArchiveKey, ArchiveStore, StorageError, StoredArchive};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tokio::io::AsyncReadExt;

#[derive(Clone, Default)]
pub struct InMemoryArchiveStore {
    archives: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.archives.read().unwrap().get(key).cloned()
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.archives.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.archives.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    async fn put_archive(
        &self,
        key: &ArchiveKey,
        mut archive: ArchiveStream,
    ) -> Result<StoredArchive, StorageError> {
        let mut buffer = Vec::new();
        archive
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| StorageError::from_read(key, e))?;

        let size_bytes = buffer.len() as u64;
        self.archives
            .write()
            .unwrap()
            .insert(key.to_string(), Bytes::from(buffer));

        Ok(StoredArchive {
            key: key.clone(),
            size_bytes,
        })
    }
}
