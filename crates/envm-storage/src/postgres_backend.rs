//! `PostgreSQL` storage backend.
//!
//! Stores all key-value data in a single `kv_store` table. Write batches run
//! inside one transaction, so a failed insert rolls back everything queued
//! before it.
//!
//! Feature-gated behind `postgres-backend`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{StorageBackend, StorageError, WriteBatch, WriteOp};

/// A storage backend backed by `PostgreSQL`.
///
/// Thread-safe via `PgPool` (connection pool). All operations are fully async.
///
/// # Examples
///
/// ```no_run
/// # use envm_storage::PostgresBackend;
/// # #[tokio::main]
/// # async fn main() {
/// let backend = PostgresBackend::connect("postgres://localhost/envm").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connect to `PostgreSQL` and create the `kv_store` table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                path: redact_url(database_url),
                reason: e.to_string(),
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (\
                key   TEXT  PRIMARY KEY, \
                value BYTEA NOT NULL\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::Open {
            path: redact_url(database_url),
            reason: format!("migration failed: {e}"),
        })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_kv_store_key_prefix \
             ON kv_store (key text_pattern_ops)",
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::Open {
            path: redact_url(database_url),
            reason: format!("index creation failed: {e}"),
        })?;

        Ok(Self { pool })
    }
}

/// Strip credentials from a connection string before it reaches logs.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &url[..scheme], &url[at + 1..])
        }
        _ => url.to_owned(),
    }
}

/// Escape `LIKE` metacharacters so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait::async_trait]
impl StorageBackend for PostgresBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(row.map(|(v,)| v))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv_store WHERE key LIKE $1 ESCAPE '\\' ORDER BY key COLLATE \"C\"",
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::List {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let tx_err = |e: sqlx::Error| StorageError::Transaction {
            reason: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    sqlx::query(
                        "INSERT INTO kv_store (key, value) VALUES ($1, $2) \
                         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
                    )
                    .bind(&key)
                    .bind(&value)
                    .execute(&mut *tx)
                    .await
                    .map_err(tx_err)?;
                }
                WriteOp::Insert { key, value } => {
                    let result = sqlx::query(
                        "INSERT INTO kv_store (key, value) VALUES ($1, $2) \
                         ON CONFLICT (key) DO NOTHING",
                    )
                    .bind(&key)
                    .bind(&value)
                    .execute(&mut *tx)
                    .await
                    .map_err(tx_err)?;

                    // Dropping `tx` rolls back everything applied so far.
                    if result.rows_affected() == 0 {
                        return Err(StorageError::KeyExists { key });
                    }
                }
                WriteOp::Delete { key } => {
                    sqlx::query("DELETE FROM kv_store WHERE key = $1")
                        .bind(&key)
                        .execute(&mut *tx)
                        .await
                        .map_err(tx_err)?;
                }
                WriteOp::Remove { key } => {
                    let result = sqlx::query("DELETE FROM kv_store WHERE key = $1")
                        .bind(&key)
                        .execute(&mut *tx)
                        .await
                        .map_err(tx_err)?;

                    // The row lock taken by DELETE makes a concurrent remover
                    // wait, then see zero rows.
                    if result.rows_affected() == 0 {
                        return Err(StorageError::KeyMissing { key });
                    }
                }
                WriteOp::Guard { key } => {
                    let row: Option<(i32,)> =
                        sqlx::query_as("SELECT 1 FROM kv_store WHERE key = $1 FOR SHARE")
                            .bind(&key)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(tx_err)?;

                    if row.is_none() {
                        return Err(StorageError::KeyMissing { key });
                    }
                }
            }
        }

        tx.commit().await.map_err(tx_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_metacharacters() {
        assert_eq!(like_prefix("variables/a_b/"), "variables/a\\_b/%");
        assert_eq!(like_prefix("50%"), "50\\%%");
        assert_eq!(like_prefix(""), "%");
    }

    #[test]
    fn redact_url_hides_credentials() {
        assert_eq!(
            redact_url("postgres://envm:hunter2@db:5432/envm"),
            "postgres://***@db:5432/envm"
        );
        assert_eq!(redact_url("postgres://db/envm"), "postgres://db/envm");
    }
}
