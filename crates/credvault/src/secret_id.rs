//! Deterministic secret identifiers.
//!
//! A secret id is `prefix + encode(username)`. The encoding keeps ASCII
//! letters, digits and `/_+=.@-` verbatim and percent-encodes every other
//! byte (including `%` itself), so ids stay ASCII-safe for any backing store
//! and two different usernames never share an id.

use std::fmt;

/// Default prefix prepended to every encoded username.
pub const DEFAULT_PREFIX: &str = "vault-secret-";

/// Backing-store key for one username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretId(String);

impl SecretId {
    /// Build the id for `username` under `prefix`.
    pub fn for_username(prefix: &str, username: &str) -> Self {
        let mut id = String::with_capacity(prefix.len() + username.len());
        id.push_str(prefix);
        for byte in username.bytes() {
            if is_safe(byte) {
                id.push(char::from(byte));
            } else {
                id.push_str(&format!("%{byte:02X}"));
            }
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SecretId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<SecretId> for String {
    fn from(id: SecretId) -> Self {
        id.0
    }
}

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'/' | b'_' | b'+' | b'=' | b'.' | b'@' | b'-')
}
