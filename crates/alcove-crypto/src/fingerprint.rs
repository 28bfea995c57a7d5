//! Public-key fingerprinting.
//!
//! A fingerprint is the SHA-256 digest of the raw public key bytes. It is
//! the stable handle for an identity: registration, challenge issuance, and
//! login all address identities by fingerprint, never by a server-assigned
//! name.

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Size of a fingerprint in bytes (SHA-256 output).
pub const FINGERPRINT_SIZE: usize = 32;

/// Deterministic hash-derived identifier for a public key.
///
/// Displayed and serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

/// Derive the fingerprint of a public key.
///
/// Pure and deterministic: the same key bytes always produce the same
/// fingerprint. Collision resistance is inherited from SHA-256.
pub fn fingerprint(public_key: &[u8]) -> Fingerprint {
    Fingerprint(Sha256::digest(public_key).into())
}

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    /// Construct from raw digest bytes.
    ///
    /// Used by storage backends that persist the binary form.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hex encoding (64 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CryptoError::InvalidFingerprint)?;
        Ok(Self(bytes))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
