//! The persisted envelope and its flat-record representation.
//!
//! An [`Envelope`] is the only structure the vault writes to a backing store.
//! It holds both ciphertext tokens and the salt needed to re-derive the key.
//! On the wire it is a flat string record:
//!
//! ```text
//! encrypted_username = <token>
//! encrypted_password = <token>
//! salt               = <standard base64 of 16 bytes>
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::backend::SecretRecord;
use crate::crypto::SALT_LEN;
use crate::error::{Result, VaultError};

pub const FIELD_ENCRYPTED_USERNAME: &str = "encrypted_username";
pub const FIELD_ENCRYPTED_PASSWORD: &str = "encrypted_password";
pub const FIELD_SALT: &str = "salt";

/// Ciphertext for one credential pair plus the salt its key was derived from.
///
/// The salt is not secret; it only has to be unique per envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub encrypted_username: String,
    pub encrypted_password: String,
    pub salt: [u8; SALT_LEN],
}

impl Envelope {
    /// Flatten into the record written to the backing store.
    pub fn to_record(&self) -> SecretRecord {
        let mut record = SecretRecord::new();
        record.insert(
            FIELD_ENCRYPTED_USERNAME.to_string(),
            self.encrypted_username.clone(),
        );
        record.insert(
            FIELD_ENCRYPTED_PASSWORD.to_string(),
            self.encrypted_password.clone(),
        );
        record.insert(FIELD_SALT.to_string(), STANDARD.encode(self.salt));
        record
    }

    /// Rebuild an envelope from a stored record.
    ///
    /// Extra fields are ignored so that newer writers can add metadata.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Format`] if a field is missing or the salt is not
    /// base64 of exactly [`SALT_LEN`] bytes.
    pub fn from_record(record: &SecretRecord) -> Result<Self> {
        let encrypted_username = required_field(record, FIELD_ENCRYPTED_USERNAME)?;
        let encrypted_password = required_field(record, FIELD_ENCRYPTED_PASSWORD)?;
        let encoded_salt = required_field(record, FIELD_SALT)?;

        let salt_bytes = STANDARD
            .decode(&encoded_salt)
            .map_err(|e| VaultError::Format {
                reason: format!("salt is not valid base64: {e}"),
            })?;
        let salt: [u8; SALT_LEN] = salt_bytes.as_slice().try_into().map_err(|_| {
            let len = salt_bytes.len();
            VaultError::Format {
                reason: format!("stored salt is {len} bytes, expected {SALT_LEN}"),
            }
        })?;

        Ok(Self {
            encrypted_username,
            encrypted_password,
            salt,
        })
    }
}

fn required_field(record: &SecretRecord, field: &str) -> Result<String> {
    record
        .get(field)
        .cloned()
        .ok_or_else(|| VaultError::Format {
            reason: format!("envelope is missing field `{field}`"),
        })
}
