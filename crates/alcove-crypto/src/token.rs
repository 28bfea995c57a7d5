//! Refresh-token and challenge-nonce encoding.
//!
//! Secrets are 32 random bytes, shown to clients as unpadded URL-safe
//! base64. Only the SHA-256 hash of a refresh token is ever persisted.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Size of a token or challenge secret in bytes.
pub const TOKEN_SECRET_SIZE: usize = 32;

/// SHA-256 hash of a refresh-token plaintext.
///
/// The storage key for refresh tokens. A database leak exposes only hashes;
/// presenting a token requires the plaintext that hashes to a stored value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Construct from raw digest bytes (storage backends).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to correlate log lines, not enough to look up a row
        write!(f, "TokenHash({}..)", &hex::encode(&self.0[..4]))
    }
}

impl serde::Serialize for TokenHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for TokenHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

/// Encode a secret as unpadded URL-safe base64.
///
/// Used for refresh-token plaintexts and challenge nonces. The caller
/// provides the random bytes.
pub fn encode_secret(bytes: &[u8; TOKEN_SECRET_SIZE]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a presented token plaintext for storage lookup.
pub fn hash_token(plaintext: &str) -> TokenHash {
    TokenHash(Sha256::digest(plaintext.as_bytes()).into())
}
