//! Caller identity: authenticated account or hashed guest session.
//!
//! DESIGN
//! ======
//! Guests carry a random 128-bit token in an HttpOnly cookie. The server only
//! ever keys data by `HMAC-SHA256(secret, token)`, so the raw token never
//! reaches a durable store and a leaked table cannot be replayed as a cookie.
//!
//! Identity is a tagged enum rather than a nullable user id; every store keyed
//! by identity takes an [`IdentityKey`] so the guest/account split is checked
//! by the compiler instead of by `NULL` conventions.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Guest token length on the wire: 16 random bytes, hex encoded.
pub const GUEST_TOKEN_HEX_LEN: usize = 32;

// =============================================================================
// TYPES
// =============================================================================

/// Hex-encoded HMAC of a guest token. Used as the guest's storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHash(String);

impl SessionHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }

    /// Wrap an already-derived hash, as seeded by tests.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn from_stored(hash: String) -> Self {
        Self(hash)
    }
}

impl fmt::Display for SessionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Billing plan of an authenticated account, as reported by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Paid,
}

impl Plan {
    #[must_use]
    pub fn from_db(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("paid") { Self::Paid } else { Self::Free }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated { user_id: Uuid, plan: Plan },
    Guest { session_hash: SessionHash },
}

impl Identity {
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        match self {
            Self::Authenticated { user_id, .. } => IdentityKey::User(*user_id),
            Self::Guest { session_hash } => IdentityKey::Session(session_hash.clone()),
        }
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }
}

/// Storage key for per-identity counters. Exactly one column is populated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(Uuid),
    Session(SessionHash),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Session(hash) => write!(f, "guest:{hash}"),
        }
    }
}

/// Outcome of guest cookie resolution.
#[derive(Debug, Clone)]
pub struct GuestSession {
    pub session_hash: SessionHash,
    /// Freshly minted token the caller must persist. `None` when the
    /// presented cookie was reused.
    pub minted_token: Option<String>,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Derives guest session hashes. Holds the keyed MAC so the secret is
/// decoded once at startup.
#[derive(Clone)]
pub struct IdentityResolver {
    mac: HmacSha256,
}

impl IdentityResolver {
    /// # Errors
    ///
    /// Returns [`ConfigError::WeakSecret`] if the secret is empty.
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::WeakSecret);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ConfigError::WeakSecret)?;
        Ok(Self { mac })
    }

    #[must_use]
    pub fn hash_token(&self, token: &str) -> SessionHash {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        SessionHash(hex::encode(mac.finalize().into_bytes()))
    }

    /// Resolve a guest from the presented cookie value. Missing or malformed
    /// tokens are replaced, never rejected.
    #[must_use]
    pub fn resolve_guest(&self, presented: Option<&str>) -> GuestSession {
        match presented.filter(|t| is_well_formed_token(t)) {
            Some(token) => GuestSession { session_hash: self.hash_token(token), minted_token: None },
            None => {
                let token = generate_guest_token();
                GuestSession { session_hash: self.hash_token(&token), minted_token: Some(token) }
            }
        }
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

/// Generate a random 16-byte hex guest token.
#[must_use]
pub fn generate_guest_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

#[must_use]
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == GUEST_TOKEN_HEX_LEN && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
