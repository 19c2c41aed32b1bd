//! Atomic write batches.

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a value, overwriting any existing one.
    Put { key: String, value: Vec<u8> },
    /// Store a value only if the key is absent; otherwise the batch fails.
    Insert { key: String, value: Vec<u8> },
    /// Remove a key. Missing keys are ignored.
    Delete { key: String },
    /// Remove a key that must be present; otherwise the batch fails.
    ///
    /// Two batches removing the same key cannot both commit, which makes
    /// this the way to consume single-use records.
    Remove { key: String },
    /// Write nothing, but fail the batch unless the key is present.
    Guard { key: String },
}

impl WriteOp {
    /// The key this operation targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. }
            | Self::Insert { key, .. }
            | Self::Delete { key }
            | Self::Remove { key }
            | Self::Guard { key } => key,
        }
    }
}

/// An ordered group of writes committed all-or-nothing by
/// [`StorageBackend::commit`](crate::StorageBackend::commit).
///
/// Operations are applied in the order they were added, so a later `Put`
/// on the same key wins over an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an overwrite of `key`.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a create-only write of `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(WriteOp::Insert {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a removal of `key`.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Queue a removal of `key` that fails the batch if it is already gone.
    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Remove { key: key.into() });
        self
    }

    /// Require `key` to still exist when the batch commits.
    pub fn guard(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Guard { key: key.into() });
        self
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Borrow the queued operations in order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations in order.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
