//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. The variants are
//! split so that callers can tell "wrong master password" apart from "no such
//! secret" apart from "storage unavailable" without inspecting strings.
//!
//! None of the variants ever carry plaintext, derived keys, or passwords.

use crate::backend::BackendError;

/// Unified error type for the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Key derivation failed (the system entropy source was unavailable).
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    /// Encryption failed inside the AEAD primitive.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// A ciphertext token or stored envelope is malformed.
    #[error("malformed data: {reason}")]
    Format { reason: String },

    /// A ciphertext did not authenticate under the supplied key (wrong key or
    /// tampered data).
    #[error("authentication failed: wrong key or tampered ciphertext")]
    Authentication,

    // -- Vault errors -------------------------------------------------------
    /// The master password did not open the envelope stored at `secret_id`.
    #[error("invalid master password for secret {secret_id}")]
    InvalidMasterPassword { secret_id: String },

    /// No envelope is stored at `secret_id`.
    #[error("secret not found: {secret_id}")]
    SecretNotFound { secret_id: String },

    /// A caller-supplied argument was rejected before any work was done.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- Backing store errors -----------------------------------------------
    /// Writing the envelope to the backing store failed.
    #[error("failed to write secret {secret_id}")]
    StoreWrite {
        secret_id: String,
        #[source]
        source: BackendError,
    },

    /// Reading the envelope from the backing store failed.
    #[error("failed to read secret {secret_id}")]
    StoreRead {
        secret_id: String,
        #[source]
        source: BackendError,
    },

    /// A backing-store call exceeded the configured I/O timeout. For a write,
    /// whether the record landed is unknown.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The caller cancelled the operation before it completed. A cancelled
    /// store never issued its write.
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    // -- Ambient errors -----------------------------------------------------
    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// I/O error from the filesystem (config files, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl VaultError {
    /// `true` if no envelope exists for the requested secret.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SecretNotFound { .. })
    }

    /// `true` if the failure was caused by a wrong key or master password.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::InvalidMasterPassword { .. }
        )
    }

    /// `true` if the backing store failed or did not answer in time.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::StoreWrite { .. } | Self::StoreRead { .. } | Self::Timeout { .. }
        )
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
