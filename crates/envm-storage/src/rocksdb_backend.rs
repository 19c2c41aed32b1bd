//! `RocksDB` storage backend for single-node deployments.
//!
//! All operations are dispatched to a blocking thread via
//! [`tokio::task::spawn_blocking`] since `RocksDB` is a synchronous C++ library.
//! Write batches are serialised through a commit lock so the existence
//! checks for inserts and the final `WriteBatch` see the same state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rocksdb::{DBWithThreadMode, MultiThreaded, Options};

use crate::{StorageBackend, StorageError, WriteBatch, WriteOp};

type Db = DBWithThreadMode<MultiThreaded>;

/// A storage backend backed by `RocksDB`.
///
/// # Examples
///
/// ```no_run
/// # use envm_storage::RocksDbBackend;
/// let backend = RocksDbBackend::open("/var/lib/envm/data").unwrap();
/// ```
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    commit_lock: Arc<Mutex<()>>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbBackend {
    /// Open a `RocksDB` database at the given path, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if `RocksDB` fails to open or create the
    /// database at the specified path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn join_error(e: &tokio::task::JoinError) -> String {
    format!("blocking task panicked: {e}")
}

fn apply_batch(db: &Db, lock: &Mutex<()>, batch: WriteBatch) -> Result<(), StorageError> {
    let _guard = lock.lock().map_err(|e| StorageError::Transaction {
        reason: format!("commit lock poisoned: {e}"),
    })?;

    let mut staged: BTreeMap<String, bool> = BTreeMap::new();
    let mut write = rocksdb::WriteBatch::default();

    let present = |staged: &BTreeMap<String, bool>, key: &str| -> Result<bool, StorageError> {
        match staged.get(key) {
            Some(present) => Ok(*present),
            None => Ok(db
                .get_pinned(key.as_bytes())
                .map_err(|e| StorageError::Read {
                    key: key.to_owned(),
                    reason: e.to_string(),
                })?
                .is_some()),
        }
    };

    for op in batch.into_ops() {
        match op {
            WriteOp::Put { key, value } => {
                write.put(key.as_bytes(), &value);
                staged.insert(key, true);
            }
            WriteOp::Insert { key, value } => {
                if present(&staged, &key)? {
                    return Err(StorageError::KeyExists { key });
                }
                write.put(key.as_bytes(), &value);
                staged.insert(key, true);
            }
            WriteOp::Delete { key } => {
                write.delete(key.as_bytes());
                staged.insert(key, false);
            }
            WriteOp::Remove { key } => {
                if !present(&staged, &key)? {
                    return Err(StorageError::KeyMissing { key });
                }
                write.delete(key.as_bytes());
                staged.insert(key, false);
            }
            WriteOp::Guard { key } => {
                if !present(&staged, &key)? {
                    return Err(StorageError::KeyMissing { key });
                }
            }
        }
    }

    db.write(write).map_err(|e| StorageError::Transaction {
        reason: e.to_string(),
    })
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            db.get(key.as_bytes()).map_err(|e| StorageError::Read {
                key,
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| StorageError::Read {
            key: String::new(),
            reason: join_error(&e),
        })?
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let iter = db.iterator(rocksdb::IteratorMode::From(
                prefix.as_bytes(),
                rocksdb::Direction::Forward,
            ));

            let mut keys = Vec::new();
            for item in iter {
                let (k, _) = item.map_err(|e| StorageError::List {
                    prefix: prefix.clone(),
                    reason: e.to_string(),
                })?;
                let key_str =
                    String::from_utf8(k.to_vec()).map_err(|e| StorageError::InvalidKey {
                        reason: e.to_string(),
                    })?;
                if !key_str.starts_with(&prefix) {
                    break;
                }
                keys.push(key_str);
            }
            Ok(keys)
        })
        .await
        .map_err(|e| StorageError::List {
            prefix: String::new(),
            reason: join_error(&e),
        })?
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.commit_lock);
        tokio::task::spawn_blocking(move || apply_batch(&db, &lock, batch))
            .await
            .map_err(|e| StorageError::Transaction {
                reason: join_error(&e),
            })?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn seed(backend: &RocksDbBackend, pairs: &[(&str, &[u8])]) {
        let mut batch = WriteBatch::new();
        for (key, value) in pairs {
            batch.put(*key, value.to_vec());
        }
        backend.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        seed(&backend, &[("orgs-by-slug/acme", b"1")]).await;

        let mut batch = WriteBatch::new();
        batch
            .insert("orgs/2", b"org".to_vec())
            .insert("orgs-by-slug/acme", b"2".to_vec());
        assert!(matches!(
            backend.commit(batch).await,
            Err(StorageError::KeyExists { .. })
        ));
        assert!(backend.get("orgs/2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_consumes_a_key_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        seed(&backend, &[("password-resets/abc", b"u1")]).await;

        let mut first = WriteBatch::new();
        first.remove("password-resets/abc").put("users/u1", b"a".to_vec());
        backend.commit(first).await.unwrap();

        let mut second = WriteBatch::new();
        second.remove("password-resets/abc").put("users/u1", b"b".to_vec());
        assert!(matches!(
            backend.commit(second).await,
            Err(StorageError::KeyMissing { .. })
        ));
        assert_eq!(backend.get("users/u1").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn guard_fails_on_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksDbBackend::open(dir.path()).unwrap();

        let mut batch = WriteBatch::new();
        batch.guard("memberships/org/1/a").put("x", b"1".to_vec());
        assert!(matches!(
            backend.commit(batch).await,
            Err(StorageError::KeyMissing { .. })
        ));
        assert!(backend.get("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_stops_at_prefix_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        seed(
            &backend,
            &[("orgs/a", b"1"), ("orgs/b", b"2"), ("projects/c", b"3")],
        )
        .await;

        assert_eq!(backend.list("orgs/").await.unwrap(), vec!["orgs/a", "orgs/b"]);
    }
}
