//! Decrypted credential pairs.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// What kind of login identifier a username looks like.
///
/// Downstream consumers use this to pick a login flow (email form, phone
/// form, or plain username form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Email,
    Phone,
    Username,
}

impl CredentialKind {
    /// Classify a login identifier.
    ///
    /// Anything containing `@` is an email; all ASCII digits (optionally with
    /// a leading `+`) is a phone number; everything else is a username.
    pub fn classify(identifier: &str) -> Self {
        if identifier.contains('@') {
            return Self::Email;
        }
        let digits = identifier.strip_prefix('+').unwrap_or(identifier);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Phone;
        }
        Self::Username
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decrypted username/password pair.
///
/// Both fields are wiped when the value is dropped, and `Debug` redacts the
/// password.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn kind(&self) -> CredentialKind {
        CredentialKind::classify(&self.username)
    }

    /// Consume into `(username, password)`.
    pub fn into_parts(mut self) -> (String, String) {
        (
            std::mem::take(&mut self.username),
            std::mem::take(&mut self.password),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
