//! Backing-store abstraction.
//!
//! The vault only needs two operations from the store that holds its
//! envelopes: create-or-replace a flat string record under a key, and read it
//! back. [`SecretBackend`] captures exactly that contract so the vault can run
//! against SQLite ([`crate::sqlite::SqliteSecretBackend`]), memory
//! ([`MemorySecretBackend`]), or a remote managed secret store.
//!
//! Retry policy belongs to the backend implementation; the vault never retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

/// A flat, string-keyed record as persisted by a backend.
pub type SecretRecord = BTreeMap<String, String>;

/// Failures reported by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The store could not be reached or refused the operation (network,
    /// permission, quota).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A record could not be serialized for writing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record exists but is not a flat string map. Retrying will not
    /// help.
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    /// A blocking task panicked or its mutex was poisoned.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Put/get-by-name storage for envelopes.
///
/// Implementations must make `put` atomic per key: a concurrent `get` sees
/// either the old record or the new one, never a mix.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Create or replace the record stored at `key`.
    async fn put(&self, key: &str, record: SecretRecord) -> Result<(), BackendError>;

    /// Read the record stored at `key`. `Ok(None)` means no such key.
    async fn get(&self, key: &str) -> Result<Option<SecretRecord>, BackendError>;
}

#[async_trait]
impl<B: SecretBackend + ?Sized> SecretBackend for Arc<B> {
    async fn put(&self, key: &str, record: SecretRecord) -> Result<(), BackendError> {
        (**self).put(key, record).await
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>, BackendError> {
        (**self).get(key).await
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local backend backed by [`DashMap`].
///
/// Cheaply cloneable; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretBackend {
    records: Arc<DashMap<String, SecretRecord>>,
}

impl MemorySecretBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Synchronous read of a stored record, for inspection.
    pub fn record(&self, key: &str) -> Option<SecretRecord> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    /// Overwrite a stored record directly, bypassing the vault.
    pub fn insert_raw(&self, key: impl Into<String>, record: SecretRecord) {
        self.records.insert(key.into(), record);
    }
}

#[async_trait]
impl SecretBackend for MemorySecretBackend {
    async fn put(&self, key: &str, record: SecretRecord) -> Result<(), BackendError> {
        self.records.insert(key.to_string(), record);
        tracing::debug!(secret_id = key, "stored record in memory backend");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>, BackendError> {
        Ok(self.record(key))
    }
}
