//! SQLite-backed secret store.
//!
//! [`SqliteSecretBackend`] wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and runs every statement on tokio's blocking pool via
//! `spawn_blocking`, so the async runtime is never stalled by file I/O.
//!
//! # Schema
//!
//! A single `secrets` table keyed by secret id. The record is stored as a JSON
//! object of strings; timestamps are unix seconds.
//!
//! Schema migration is automatic: [`SqliteSecretBackend::open`] creates the
//! table if it does not exist.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::backend::{BackendError, SecretBackend, SecretRecord};

/// Durable backend storing envelopes in a local SQLite database.
#[derive(Clone)]
pub struct SqliteSecretBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSecretBackend {
    /// Open (or create) a database at `path` and run migrations.
    ///
    /// Blocks briefly on file I/O; call during startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening secret database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Unavailable(format!(
                    "cannot create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, BackendError> {
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// SQLite pragmas for durability with concurrent readers.
    fn configure_connection(conn: &Connection) -> Result<(), BackendError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    fn run_migrations(conn: &Connection) -> Result<(), BackendError> {
        tracing::debug!("running secret store schema migrations");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS secrets (
                secret_id  TEXT PRIMARY KEY,
                record     TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn execute<F, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| BackendError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    /// Unix timestamp (seconds) at which `key` was first stored.
    pub async fn created_at(&self, key: &str) -> Result<Option<i64>, BackendError> {
        let key = key.to_string();
        self.execute(move |conn| {
            let ts = conn
                .query_row(
                    "SELECT created_at FROM secrets WHERE secret_id = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(ts)
        })
        .await
    }

    /// Number of stored secrets.
    pub async fn count(&self) -> Result<u64, BackendError> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM secrets", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

#[async_trait]
impl SecretBackend for SqliteSecretBackend {
    async fn put(&self, key: &str, record: SecretRecord) -> Result<(), BackendError> {
        let key = key.to_string();
        let json = serde_json::to_string(&record)?;
        let now = Utc::now().timestamp();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO secrets (secret_id, record, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(secret_id) DO UPDATE SET
                     record = excluded.record,
                     updated_at = excluded.updated_at",
                params![key, json, now],
            )?;
            tracing::debug!(secret_id = %key, "stored record in sqlite backend");
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>, BackendError> {
        let key = key.to_string();
        let json: Option<String> = self
            .execute(move |conn| {
                let json = conn
                    .query_row(
                        "SELECT record FROM secrets WHERE secret_id = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(json)
            })
            .await?;

        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| BackendError::Corrupt(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
