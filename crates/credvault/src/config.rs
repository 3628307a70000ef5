//! Vault configuration.
//!
//! [`VaultConfig`] has sensible defaults for every field, can be loaded from a
//! TOML file, and accepts `CREDVAULT_*` environment overrides on top. A
//! builder-style API allows callers to customise individual fields fluently.
//!
//! ```toml
//! secret_prefix = "vault-secret-"
//! kdf_iterations = 600000
//! io_timeout_ms = 10000
//! database_path = "data/credvault.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::KdfIterations;
use crate::error::{Result, VaultError};
use crate::secret_id::DEFAULT_PREFIX;

pub const ENV_SECRET_PREFIX: &str = "CREDVAULT_SECRET_PREFIX";
pub const ENV_KDF_ITERATIONS: &str = "CREDVAULT_KDF_ITERATIONS";
pub const ENV_IO_TIMEOUT_MS: &str = "CREDVAULT_IO_TIMEOUT_MS";
pub const ENV_DATABASE_PATH: &str = "CREDVAULT_DATABASE_PATH";

/// Settings for a [`CredentialVault`](crate::vault::CredentialVault) and the
/// SQLite backend the CLI opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Prefix prepended to every encoded username to form its secret id.
    ///
    /// Default: **`vault-secret-`**.
    pub secret_prefix: String,

    /// PBKDF2-HMAC-SHA256 iterations. Values below 100 000 are rejected.
    ///
    /// Default: **600 000**.
    pub kdf_iterations: KdfIterations,

    /// Upper bound on each backing-store call, in milliseconds.
    ///
    /// Default: **10 000 ms**.
    pub io_timeout_ms: u64,

    /// Location of the SQLite database used by the CLI.
    ///
    /// Default: **`data/credvault.db`**.
    pub database_path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_prefix: DEFAULT_PREFIX.to_string(),
            kdf_iterations: KdfIterations::default(),
            io_timeout_ms: 10_000,
            database_path: PathBuf::from("data/credvault.db"),
        }
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.secret_prefix = prefix.into();
        self
    }

    pub fn with_kdf_iterations(mut self, iterations: KdfIterations) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_io_timeout_ms(mut self, ms: u64) -> Self {
        self.io_timeout_ms = ms;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| VaultError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Apply `CREDVAULT_*` overrides read through `lookup`.
    ///
    /// Pass `|name| std::env::var(name).ok()` to read the process environment.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup(ENV_SECRET_PREFIX) {
            self.secret_prefix = prefix;
        }

        if let Some(raw) = lookup(ENV_KDF_ITERATIONS) {
            let value: u32 = raw.trim().parse().map_err(|_| VaultError::Config {
                reason: format!("{ENV_KDF_ITERATIONS} is not a number: {raw:?}"),
            })?;
            self.kdf_iterations =
                KdfIterations::try_from(value).map_err(|reason| VaultError::Config { reason })?;
        }

        if let Some(raw) = lookup(ENV_IO_TIMEOUT_MS) {
            self.io_timeout_ms = raw.trim().parse().map_err(|_| VaultError::Config {
                reason: format!("{ENV_IO_TIMEOUT_MS} is not a number: {raw:?}"),
            })?;
        }

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the vault cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.secret_prefix.is_empty() || !self.secret_prefix.is_ascii() {
            return Err(VaultError::Config {
                reason: "secret_prefix must be a non-empty ASCII string".into(),
            });
        }
        if self.io_timeout_ms == 0 {
            return Err(VaultError::Config {
                reason: "io_timeout_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
