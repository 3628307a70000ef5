//! Password-based key derivation and authenticated encryption of short
//! strings, built on `ring`.
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 turns a password and a 128-bit
//!   salt into a 256-bit [`DerivedKey`]. The same `(password, salt)` always
//!   yields the same key, which is what makes decryption possible.
//! - **Encryption**: AES-256-GCM with a random 96-bit nonce per call. The
//!   output is a single base64url token that carries everything needed to
//!   decrypt it except the key.
//! - **Key commitment**: every token embeds an HMAC-SHA256 commitment to the
//!   key. It is checked in constant time before the AEAD is opened, so a
//!   token only opens under the key that produced it.
//!
//! # Token layout
//!
//! ```text
//! base64url( [1 byte: version 0x01]
//!            [12 bytes: nonce]
//!            [32 bytes: key commitment]
//!            [remaining: AES-256-GCM ciphertext + 16-byte tag] )
//! ```
//!
//! The AES key and the commitment are two HMAC-SHA256 outputs of the derived
//! key under distinct labels, so the raw derived key is never used directly.

use std::fmt;
use std::num::NonZeroU32;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::hmac;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the key commitment embedded in every token.
pub const COMMITMENT_LEN: usize = 32;

/// Length of the AES-256-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Current token format version.
pub const TOKEN_VERSION: u8 = 0x01;

/// Smallest decoded token: version + nonce + commitment + tag (empty plaintext).
const MIN_TOKEN_LEN: usize = 1 + NONCE_LEN + COMMITMENT_LEN + TAG_LEN;

const ENC_LABEL: &[u8] = b"credvault/enc/v1";
const COMMIT_LABEL: &[u8] = b"credvault/commit/v1";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Iterations
// ---------------------------------------------------------------------------

/// PBKDF2 iteration count, never below [`KdfIterations::MIN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct KdfIterations(NonZeroU32);

impl KdfIterations {
    /// Lowest accepted iteration count.
    pub const MIN: Self = Self(NonZeroU32::new(100_000).unwrap());

    /// OWASP (2023) recommendation for PBKDF2-HMAC-SHA256.
    pub const RECOMMENDED: Self = Self(NonZeroU32::new(600_000).unwrap());

    /// Returns `None` if `iterations` is below [`KdfIterations::MIN`].
    pub fn new(iterations: u32) -> Option<Self> {
        if iterations < Self::MIN.get() {
            return None;
        }
        NonZeroU32::new(iterations).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for KdfIterations {
    fn default() -> Self {
        Self::RECOMMENDED
    }
}

impl TryFrom<u32> for KdfIterations {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "kdf_iterations must be at least {}, got {value}",
                Self::MIN.get()
            )
        })
    }
}

impl From<KdfIterations> for u32 {
    fn from(value: KdfIterations) -> Self {
        value.get()
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A 256-bit key derived from a password and salt.
///
/// The bytes are wiped from memory when the key is dropped, and `Debug` never
/// prints them.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    /// Raw key bytes. Only needed for comparisons in tests and diagnostics.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA256, self.0.as_slice())
    }

    fn aead_key(&self) -> Result<UnboundKey> {
        let tag = hmac::sign(&self.hmac_key(), ENC_LABEL);
        UnboundKey::new(AEAD_ALG, tag.as_ref()).map_err(|_| VaultError::Encryption {
            reason: "failed to create AES-256-GCM key".into(),
        })
    }

    fn commitment(&self) -> hmac::Tag {
        hmac::sign(&self.hmac_key(), COMMIT_LABEL)
    }

    fn verify_commitment(&self, commitment: &[u8]) -> bool {
        hmac::verify(&self.hmac_key(), COMMIT_LABEL, commitment).is_ok()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors, so each
/// bound key is used for a single seal or open.
struct SingleNonce(Option<[u8; NONCE_LEN]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Generate a fresh random salt.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivation`] if the system CSPRNG fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| VaultError::KeyDerivation {
            reason: "failed to generate random salt".into(),
        })?;
    Ok(salt)
}

/// Derive a 256-bit key from `password` with PBKDF2-HMAC-SHA256.
///
/// When `salt` is `None` a fresh random salt is generated. The salt actually
/// used is returned alongside the key; callers must persist it to derive the
/// same key again.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivation`] only if salt generation fails.
pub fn derive_key(
    password: &str,
    salt: Option<[u8; SALT_LEN]>,
    iterations: KdfIterations,
) -> Result<(DerivedKey, [u8; SALT_LEN])> {
    let salt = match salt {
        Some(salt) => salt,
        None => generate_salt()?,
    };

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(PBKDF2_ALG, iterations.0, &salt, password.as_bytes(), &mut *key);

    tracing::debug!(iterations = iterations.get(), "derived key via PBKDF2");

    Ok((DerivedKey(key), salt))
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` and return a base64url token.
///
/// Every call draws a new random nonce, so encrypting the same plaintext twice
/// produces different tokens.
///
/// # Errors
///
/// Returns [`VaultError::Encryption`] if nonce generation or sealing fails.
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::Encryption {
            reason: "failed to generate random nonce".into(),
        })?;

    let mut sealing_key = SealingKey::new(key.aead_key()?, SingleNonce(Some(nonce)));

    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Encryption {
            reason: "seal_in_place failed".into(),
        })?;

    let commitment = key.commitment();
    let mut raw = Vec::with_capacity(1 + NONCE_LEN + COMMITMENT_LEN + in_out.len());
    raw.push(TOKEN_VERSION);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(commitment.as_ref());
    raw.extend_from_slice(&in_out);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        token_len = raw.len(),
        "encrypted data"
    );

    Ok(URL_SAFE.encode(raw))
}

/// Decrypt a token produced by [`encrypt`].
///
/// # Errors
///
/// - [`VaultError::Format`] if the token is not valid base64, is truncated,
///   has an unknown version, or decrypts to non-UTF-8 bytes.
/// - [`VaultError::Authentication`] if the key commitment or the GCM tag does
///   not verify under `key`.
pub fn decrypt(token: &str, key: &DerivedKey) -> Result<String> {
    let raw = URL_SAFE.decode(token).map_err(|e| VaultError::Format {
        reason: format!("token is not valid base64: {e}"),
    })?;

    if raw.len() < MIN_TOKEN_LEN {
        return Err(VaultError::Format {
            reason: format!(
                "token is {} bytes, expected at least {MIN_TOKEN_LEN}",
                raw.len()
            ),
        });
    }

    let (&version, rest) = raw.split_first().ok_or_else(|| VaultError::Format {
        reason: "empty token".into(),
    })?;
    if version != TOKEN_VERSION {
        return Err(VaultError::Format {
            reason: format!("unsupported token version {version:#04x}"),
        });
    }

    let (nonce_bytes, rest) = rest.split_at(NONCE_LEN);
    let (commitment, ciphertext) = rest.split_at(COMMITMENT_LEN);

    if !key.verify_commitment(commitment) {
        return Err(VaultError::Authentication);
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(nonce_bytes);
    let mut opening_key = OpeningKey::new(key.aead_key()?, SingleNonce(Some(nonce)));

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext = opening_key
        .open_in_place(Aad::empty(), in_out.as_mut_slice())
        .map_err(|_| VaultError::Authentication)?;

    tracing::trace!(
        token_len = raw.len(),
        plaintext_len = plaintext.len(),
        "decrypted data"
    );

    String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::Format {
        reason: "decrypted data is not valid UTF-8".into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
