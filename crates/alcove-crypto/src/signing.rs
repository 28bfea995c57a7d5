//! Ed25519 signature verification for challenge responses.
//!
//! The server never signs anything with identity keys; it only verifies
//! that a client-produced signature covers the exact challenge bytes under
//! the registered public key.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::CryptoError;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Parse and validate raw public key bytes.
///
/// Rejects wrong lengths and byte strings that do not decode to a valid
/// curve point.
pub fn parse_public_key(bytes: &[u8]) -> Result<VerifyingKey, CryptoError> {
    let arr: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Verify an Ed25519 signature over `message` under `public_key`.
///
/// Returns `Ok(())` only when the signature is valid over exactly these
/// message bytes. Any bit flip in message or signature, or a different
/// keypair, fails with [`CryptoError::InvalidSignature`].
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = parse_public_key(public_key)?;

    let sig_bytes: [u8; SIGNATURE_SIZE] =
        signature.try_into().map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);

    key.verify(message, &signature).map_err(|_| CryptoError::InvalidSignature)
}
