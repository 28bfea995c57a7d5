//! Error taxonomy for the Alcove core.
//!
//! Internal distinctions stay precise here (unknown fingerprint vs. bad
//! signature vs. missing challenge); the HTTP boundary is responsible for
//! collapsing them into a single generic unauthorized response so callers
//! cannot enumerate fingerprints or probe the verifier.

use alcove_crypto::CryptoError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors from authentication and messaging core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// An identity with this fingerprint is already registered.
    #[error("an identity with this fingerprint already exists")]
    DuplicateFingerprint,

    /// No identity is registered under this fingerprint or id.
    #[error("identity not found")]
    IdentityNotFound,

    /// Public key bytes are malformed or not a valid Ed25519 point.
    #[error("public key is malformed")]
    InvalidPublicKey,

    /// No outstanding challenge matches the presented one.
    ///
    /// Also the outcome the loser of a concurrent duplicate verification
    /// observes: the winner consumed the challenge first.
    #[error("no matching outstanding challenge")]
    ChallengeNotFound,

    /// The challenge exists but its validity window has passed.
    #[error("challenge has expired")]
    ChallengeExpired,

    /// The signature does not verify over the exact challenge bytes.
    #[error("signature does not verify over the challenge")]
    InvalidSignature,

    /// The refresh token exists but is past its expiry.
    #[error("refresh token has expired")]
    TokenExpired,

    /// The token is unknown, revoked, or otherwise unusable.
    #[error("refresh token is not valid")]
    TokenInvalid,

    /// An already-rotated refresh token was presented again.
    ///
    /// Treated as evidence of token theft: the whole family has been
    /// revoked before this error is returned. Never silently recovered.
    #[error("refresh token reuse detected; token family revoked")]
    TokenReuseDetected,

    /// The identity is suspended (possibly until a given time).
    #[error("identity is suspended")]
    Suspended,

    /// The caller is not allowed to act on this resource.
    #[error("caller is not a participant in this conversation")]
    Forbidden,

    /// A referenced resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Structurally invalid input (sizes, counts, encodings).
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Access-token signing or verification infrastructure failed.
    ///
    /// Indicates a configuration problem (bad secret), not caller error.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// Storage backend failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPublicKey => Self::InvalidPublicKey,
            CryptoError::InvalidSignature => Self::InvalidSignature,
            CryptoError::InvalidFingerprint => Self::InvalidInput("fingerprint encoding"),
            CryptoError::EnvelopeFormat(_) | CryptoError::AeadFailure => {
                Self::InvalidInput("key envelope")
            },
        }
    }
}
