//! Master-password credential vault.
//!
//! This crate turns a `(username, password)` pair plus a master password into
//! a durable, encrypted envelope and back. Every stored secret gets its own
//! random salt, so no two secrets share key material even when the same
//! master password is reused.
//!
//! # Modules
//!
//! - [`crypto`] — PBKDF2-HMAC-SHA256 key derivation, AES-256-GCM tokens with
//!   key commitment.
//! - [`envelope`] — The persisted record and its flat string form.
//! - [`secret_id`] — Deterministic, ASCII-safe ids derived from usernames.
//! - [`backend`] — Backing-store trait and an in-memory implementation.
//! - [`sqlite`] — SQLite-backed store.
//! - [`vault`] — [`CredentialVault`], orchestrating all of the above.
//! - [`credential`] — Decrypted credentials and credential-kind detection.
//! - [`config`] — Configuration loading and validation.
//! - [`error`] — Unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use credvault::{CredentialVault, SqliteSecretBackend, VaultConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VaultConfig::default();
//! let backend = SqliteSecretBackend::open(&config.database_path)?;
//! let vault = CredentialVault::with_config(backend, &config)?;
//! let cancel = CancellationToken::new();
//!
//! let id = vault.store("alice", "p@ss1", "master1", &cancel).await?;
//! let creds = vault.retrieve("alice", "master1", &cancel).await?;
//! assert_eq!(creds.password(), "p@ss1");
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod secret_id;
pub mod sqlite;
pub mod vault;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{BackendError, MemorySecretBackend, SecretBackend, SecretRecord};
pub use config::VaultConfig;
pub use credential::{CredentialKind, Credentials};
pub use crypto::KdfIterations;
pub use envelope::Envelope;
pub use error::{Result, VaultError};
pub use secret_id::SecretId;
pub use sqlite::SqliteSecretBackend;
pub use vault::CredentialVault;
