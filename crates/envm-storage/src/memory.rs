//! In-memory storage backend for testing.
//!
//! This backend stores all data in a `BTreeMap` behind a `RwLock`. It is not
//! persistent and all data is lost when the process exits. Use this for unit
//! tests, integration tests, and throwaway local servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError, WriteBatch, WriteOp};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Thread-safe and async-compatible. Data is sorted by key, which makes
/// prefix listing efficient via `BTreeMap::range`.
///
/// # Examples
///
/// ```
/// # use envm_storage::{MemoryBackend, StorageBackend, WriteBatch};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// let mut batch = WriteBatch::new();
/// batch.put("users/1", b"data".to_vec());
/// backend.commit(batch).await.unwrap();
/// let val = backend.get("users/1").await.unwrap();
/// assert_eq!(val, Some(b"data".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        let keys = data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut data = self.data.write().await;

        // Stage against an overlay so a failing condition leaves `data` untouched.
        let mut staged: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
        let present = |staged: &BTreeMap<String, Option<Vec<u8>>>, key: &str| match staged.get(key) {
            Some(slot) => slot.is_some(),
            None => data.contains_key(key),
        };

        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    staged.insert(key, Some(value));
                }
                WriteOp::Insert { key, value } => {
                    if present(&staged, &key) {
                        return Err(StorageError::KeyExists { key });
                    }
                    staged.insert(key, Some(value));
                }
                WriteOp::Delete { key } => {
                    staged.insert(key, None);
                }
                WriteOp::Remove { key } => {
                    if !present(&staged, &key) {
                        return Err(StorageError::KeyMissing { key });
                    }
                    staged.insert(key, None);
                }
                WriteOp::Guard { key } => {
                    if !present(&staged, &key) {
                        return Err(StorageError::KeyMissing { key });
                    }
                }
            }
        }

        for (key, slot) in staged {
            match slot {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
