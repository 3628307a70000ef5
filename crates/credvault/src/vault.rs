//! The credential vault.
//!
//! [`CredentialVault`] turns `(username, password)` plus a master password into
//! an [`Envelope`] and writes it to an injected [`SecretBackend`]; retrieval
//! reverses the process.
//!
//! # Flow
//!
//! ```text
//! store:    derive(master, fresh salt) -> encrypt(username), encrypt(password)
//!           -> Envelope { tokens, salt } -> backend.put(secret_id)
//! retrieve: backend.get(secret_id) -> Envelope -> derive(master, stored salt)
//!           -> decrypt both tokens -> Credentials
//! ```
//!
//! The vault keeps no key material between calls. Every call re-derives its
//! key on the blocking pool and drops (and wipes) it before returning, so
//! concurrent calls share nothing but the backend.
//!
//! # Cancellation
//!
//! [`store`](CredentialVault::store) and [`retrieve`](CredentialVault::retrieve)
//! take a [`CancellationToken`]. It is checked before key derivation, raced
//! against derivation and backend reads, and checked once more before the
//! backend write. Once the write is issued it is bounded only by the
//! configured I/O timeout, so a store that reports
//! [`Cancelled`](VaultError::Cancelled) never wrote anything.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::backend::{BackendError, SecretBackend};
use crate::config::VaultConfig;
use crate::credential::Credentials;
use crate::crypto::{self, KdfIterations};
use crate::envelope::Envelope;
use crate::error::{Result, VaultError};
use crate::secret_id::SecretId;

/// Encrypted credential vault in front of a [`SecretBackend`].
///
/// # Example
///
/// ```rust
/// # use credvault::{CredentialVault, MemorySecretBackend};
/// # async fn example() -> credvault::Result<()> {
/// let vault = CredentialVault::new(MemorySecretBackend::new());
///
/// let id = vault.store_secret("alice", "p@ss1", "master1").await?;
/// assert_eq!(id, "vault-secret-alice");
///
/// let (username, password) = vault.retrieve_secret("alice", "master1").await?;
/// assert_eq!((username.as_str(), password.as_str()), ("alice", "p@ss1"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialVault<B> {
    backend: B,
    secret_prefix: String,
    kdf_iterations: KdfIterations,
    io_timeout: Duration,
}

impl<B: SecretBackend> CredentialVault<B> {
    /// Create a vault over `backend` with the default configuration.
    pub fn new(backend: B) -> Self {
        let config = VaultConfig::default();
        Self {
            backend,
            secret_prefix: config.secret_prefix.clone(),
            kdf_iterations: config.kdf_iterations,
            io_timeout: config.io_timeout(),
        }
    }

    /// Create a vault over `backend` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if `config` fails validation.
    pub fn with_config(backend: B, config: &VaultConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            secret_prefix: config.secret_prefix.clone(),
            kdf_iterations: config.kdf_iterations,
            io_timeout: config.io_timeout(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backing-store key used for `username`.
    pub fn secret_id(&self, username: &str) -> SecretId {
        SecretId::for_username(&self.secret_prefix, username)
    }

    // -- Store ----------------------------------------------------------------

    /// Encrypt `(username, password)` under a key derived from
    /// `master_password` and a fresh salt, and write the envelope at the
    /// username's secret id, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidInput`] if any argument is empty.
    /// - [`VaultError::StoreWrite`] if the backend rejects the write.
    /// - [`VaultError::Cancelled`] if `cancel` fired before the write was
    ///   issued. Nothing was written.
    /// - [`VaultError::Timeout`] if the write did not complete in time. The
    ///   write may or may not have landed.
    pub async fn store(
        &self,
        username: &str,
        password: &str,
        master_password: &str,
        cancel: &CancellationToken,
    ) -> Result<SecretId> {
        require_non_empty("username", username)?;
        require_non_empty("password", password)?;
        require_non_empty("master password", master_password)?;

        let secret_id = self.secret_id(username);
        let started = Instant::now();

        ensure_not_cancelled("store", cancel)?;

        let envelope = {
            let username = Zeroizing::new(username.to_string());
            let password = Zeroizing::new(password.to_string());
            let master = Zeroizing::new(master_password.to_string());
            let iterations = self.kdf_iterations;
            run_blocking("store", cancel, move || {
                seal_envelope(&username, &password, &master, iterations)
            })
            .await?
        };

        ensure_not_cancelled("store", cancel)?;

        let write = self.backend.put(secret_id.as_str(), envelope.to_record());
        self.bounded("store", write)
            .await?
            .map_err(|source| VaultError::StoreWrite {
                secret_id: secret_id.to_string(),
                source,
            })?;

        tracing::info!(
            secret_id = %secret_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stored secret"
        );

        Ok(secret_id)
    }

    // -- Retrieve -------------------------------------------------------------

    /// Read the envelope for `username` and decrypt it with a key re-derived
    /// from `master_password` and the stored salt.
    ///
    /// Either both fields decrypt or the call fails; no partial result is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SecretNotFound`] if nothing is stored for `username`.
    /// - [`VaultError::InvalidMasterPassword`] if the master password does
    ///   not open the envelope.
    /// - [`VaultError::Format`] if the stored envelope is malformed.
    /// - [`VaultError::StoreRead`], [`VaultError::Timeout`],
    ///   [`VaultError::Cancelled`] for backend failures.
    pub async fn retrieve(
        &self,
        username: &str,
        master_password: &str,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        require_non_empty("username", username)?;

        let secret_id = self.secret_id(username);
        let started = Instant::now();

        let envelope = self.load_envelope(&secret_id, cancel).await?;

        let master = Zeroizing::new(master_password.to_string());
        let iterations = self.kdf_iterations;
        let opened = run_blocking("retrieve", cancel, move || {
            open_envelope(&envelope, &master, iterations)
        })
        .await;

        let credentials = match opened {
            Ok(credentials) => credentials,
            Err(VaultError::Authentication) => {
                tracing::warn!(secret_id = %secret_id, "master password rejected");
                return Err(VaultError::InvalidMasterPassword {
                    secret_id: secret_id.into(),
                });
            }
            Err(e) => return Err(e),
        };

        if credentials.username() != username {
            return Err(VaultError::Format {
                reason: format!("envelope at {secret_id} belongs to a different username"),
            });
        }

        tracing::info!(
            secret_id = %secret_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved secret"
        );

        Ok(credentials)
    }

    /// Whether an envelope is stored for `username`. Derives no keys.
    pub async fn exists(&self, username: &str, cancel: &CancellationToken) -> Result<bool> {
        require_non_empty("username", username)?;
        let secret_id = self.secret_id(username);

        let record = self
            .backend_call("exists", cancel, self.backend.get(secret_id.as_str()))
            .await?
            .map_err(|source| read_failure(&secret_id, source))?;

        Ok(record.is_some())
    }

    // -- Caller-facing shorthands ---------------------------------------------

    /// [`store`](Self::store) without cancellation, returning the id as a
    /// string.
    pub async fn store_secret(
        &self,
        username: &str,
        password: &str,
        master_password: &str,
    ) -> Result<String> {
        let id = self
            .store(username, password, master_password, &CancellationToken::new())
            .await?;
        Ok(id.into())
    }

    /// [`retrieve`](Self::retrieve) without cancellation, returning
    /// `(username, password)`.
    pub async fn retrieve_secret(
        &self,
        username: &str,
        master_password: &str,
    ) -> Result<(String, String)> {
        let credentials = self
            .retrieve(username, master_password, &CancellationToken::new())
            .await?;
        Ok(credentials.into_parts())
    }

    // -- Internal helpers -----------------------------------------------------

    async fn load_envelope(
        &self,
        secret_id: &SecretId,
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        let record = self
            .backend_call("retrieve", cancel, self.backend.get(secret_id.as_str()))
            .await?
            .map_err(|source| read_failure(secret_id, source))?
            .ok_or_else(|| VaultError::SecretNotFound {
                secret_id: secret_id.to_string(),
            })?;

        tracing::debug!(secret_id = %secret_id, "loaded envelope");
        Envelope::from_record(&record)
    }

    /// Race a backend future against `cancel` and the I/O timeout.
    async fn backend_call<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<std::result::Result<T, BackendError>>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VaultError::Cancelled { operation }),
            outcome = self.bounded(operation, call) => outcome,
        }
    }

    /// Bound a backend future by the I/O timeout only.
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<std::result::Result<T, BackendError>>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        let timeout_ms = self.io_timeout.as_millis() as u64;
        tokio::time::timeout(self.io_timeout, call)
            .await
            .map_err(|_| VaultError::Timeout { operation, timeout_ms })
    }
}

// ---------------------------------------------------------------------------
// Crypto steps (run on the blocking pool)
// ---------------------------------------------------------------------------

fn seal_envelope(
    username: &str,
    password: &str,
    master_password: &str,
    iterations: KdfIterations,
) -> Result<Envelope> {
    let (key, salt) = crypto::derive_key(master_password, None, iterations)?;
    Ok(Envelope {
        encrypted_username: crypto::encrypt(username, &key)?,
        encrypted_password: crypto::encrypt(password, &key)?,
        salt,
    })
}

fn open_envelope(
    envelope: &Envelope,
    master_password: &str,
    iterations: KdfIterations,
) -> Result<Credentials> {
    let (key, _) = crypto::derive_key(master_password, Some(envelope.salt), iterations)?;
    let username = crypto::decrypt(&envelope.encrypted_username, &key)?;
    let password = crypto::decrypt(&envelope.encrypted_password, &key)?;
    Ok(Credentials::new(username, password))
}

async fn run_blocking<T, F>(operation: &'static str, cancel: &CancellationToken, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VaultError::Cancelled { operation }),
        joined = handle => joined?,
    }
}

/// A record that exists but cannot be decoded is data corruption, not an
/// unavailable store.
fn read_failure(secret_id: &SecretId, source: BackendError) -> VaultError {
    match source {
        BackendError::Corrupt(reason) => VaultError::Format {
            reason: format!("stored record at {secret_id} is corrupt: {reason}"),
        },
        source => VaultError::StoreRead {
            secret_id: secret_id.to_string(),
            source,
        },
    }
}

fn ensure_not_cancelled(operation: &'static str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled { operation });
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VaultError::InvalidInput {
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
