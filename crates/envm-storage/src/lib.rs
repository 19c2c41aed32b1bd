//! Storage backend abstraction for envm.
//!
//! This crate defines the [`StorageBackend`] trait, a pure key-value storage
//! interface that knows nothing about users, organizations, or variables. The
//! typed repository in `envm-core` serializes records and index entries into
//! this layer and groups related writes into a [`WriteBatch`] so that they
//! commit as a single unit.
//!
//! Three implementations are provided:
//!
//! - [`MemoryBackend`]: in-memory, for tests and local development
//! - [`PostgresBackend`]: backed by `PostgreSQL` (feature `postgres-backend`)
//! - [`RocksDbBackend`]: embedded, backed by `RocksDB` (feature `rocksdb-backend`)

mod batch;
mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use batch::{WriteBatch, WriteOp};
pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `users/<id>`,
/// `memberships/org/<org>/<user>`). Values are opaque byte arrays.
///
/// All writes go through [`commit`](StorageBackend::commit), so every
/// mutation is part of an atomic [`WriteBatch`].
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// List all keys that start with the given prefix, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Apply every operation in `batch` atomically.
    ///
    /// Either all operations become visible or none do. A
    /// [`WriteOp::Insert`] on a key that already exists, or a
    /// [`WriteOp::Remove`] / [`WriteOp::Guard`] on a key that does not,
    /// aborts the whole batch. Conditions are evaluated against the state
    /// at commit time, so concurrent batches consuming the same key
    /// cannot both succeed.
    ///
    /// # Errors
    ///
    /// - [`StorageError::KeyExists`] if an insert collides with an existing key.
    /// - [`StorageError::KeyMissing`] if a remove or guard finds no key.
    /// - [`StorageError::Transaction`] if the backend fails to commit.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;
}
