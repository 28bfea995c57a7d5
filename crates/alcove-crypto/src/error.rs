//! Error types for Alcove cryptographic operations.

use thiserror::Error;

/// Errors that can occur in cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key bytes are not a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes are malformed or do not verify over the message.
    #[error("invalid signature")]
    InvalidSignature,

    /// Fingerprint string is not 64 lowercase hex characters.
    #[error("invalid fingerprint encoding")]
    InvalidFingerprint,

    /// Envelope bytes do not match the expected wire layout.
    #[error("malformed key envelope: {0}")]
    EnvelopeFormat(&'static str),

    /// AEAD operation failed (wrong key, tampered ciphertext, or bad tag).
    #[error("AEAD failure")]
    AeadFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        assert_eq!(CryptoError::InvalidPublicKey.to_string(), "invalid public key");
        assert_eq!(
            CryptoError::EnvelopeFormat("truncated").to_string(),
            "malformed key envelope: truncated"
        );
    }
}
