//! Conversation key envelopes.
//!
//! A conversation has one 32-byte symmetric content key, generated by the
//! creating client and never shown to the server. For each participant the
//! creator wraps the content key into an envelope:
//!
//! 1. generate a fresh ephemeral X25519 keypair,
//! 2. ECDH with the participant's X25519 public key,
//! 3. HKDF-SHA256 the shared secret (bound to both public keys) into a
//!    wrap key,
//! 4. XChaCha20-Poly1305 encrypt the content key under the wrap key.
//!
//! The participant's X25519 key is the birational image of their Ed25519
//! identity key, so registering one keypair covers both signing and key
//! agreement.
//!
//! All functions are pure - random bytes must be provided by the caller.
//! This enables deterministic testing.
//!
//! # Wire format
//!
//! ```text
//! version(1) || ephemeral_pub(32) || nonce(24) || ciphertext(32 + 16 tag)
//! ```

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Size of a conversation content key in bytes.
pub const CONTENT_KEY_SIZE: usize = 32;

/// Size of the envelope AEAD nonce in bytes (XChaCha20).
pub const ENVELOPE_NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Total encoded envelope size in bytes.
pub const ENVELOPE_SIZE: usize = 1 + 32 + ENVELOPE_NONCE_SIZE + CONTENT_KEY_SIZE + POLY1305_TAG_SIZE;

/// Wire format version byte.
const ENVELOPE_VERSION: u8 = 1;

/// Label used for wrap-key derivation
const ENVELOPE_LABEL: &[u8] = b"alcoveKeyEnvelopeV1";

/// A sealed per-participant copy of a conversation content key.
///
/// Opaque to the server: it stores and returns the encoded bytes without
/// ever being able to unwrap them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEnvelope {
    /// Ephemeral X25519 public key used for this envelope's ECDH.
    pub ephemeral_public: [u8; 32],
    /// XChaCha20 nonce.
    pub nonce: [u8; ENVELOPE_NONCE_SIZE],
    /// Wrapped content key including the Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl KeyEnvelope {
    /// Encode to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_SIZE);
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.ephemeral_public);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decode from the wire format.
    ///
    /// Validates version and exact length; the ciphertext itself is only
    /// authenticated when a holder of the matching secret calls
    /// [`open_content_key`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ENVELOPE_SIZE {
            return Err(CryptoError::EnvelopeFormat("wrong length"));
        }
        if bytes[0] != ENVELOPE_VERSION {
            return Err(CryptoError::EnvelopeFormat("unsupported version"));
        }

        let mut ephemeral_public = [0u8; 32];
        ephemeral_public.copy_from_slice(&bytes[1..33]);

        let mut nonce = [0u8; ENVELOPE_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[33..33 + ENVELOPE_NONCE_SIZE]);

        Ok(Self { ephemeral_public, nonce, ciphertext: bytes[33 + ENVELOPE_NONCE_SIZE..].to_vec() })
    }
}

/// X25519 public key corresponding to an Ed25519 identity key.
pub fn encryption_public_key(identity: &VerifyingKey) -> PublicKey {
    PublicKey::from(identity.to_montgomery().to_bytes())
}

/// X25519 secret corresponding to an Ed25519 signing key.
///
/// Client-side helper: the secret never reaches the server.
pub fn encryption_secret_key(identity: &SigningKey) -> StaticSecret {
    StaticSecret::from(identity.to_scalar_bytes())
}

/// Seal a content key for one participant.
///
/// `ephemeral_secret` and `nonce` must be fresh cryptographically secure
/// random bytes; reusing either across envelopes leaks nothing about the
/// content key but violates the uniqueness the format promises.
pub fn seal_content_key(
    recipient: &PublicKey,
    content_key: &[u8; CONTENT_KEY_SIZE],
    ephemeral_secret: [u8; 32],
    nonce: [u8; ENVELOPE_NONCE_SIZE],
) -> Result<KeyEnvelope, CryptoError> {
    let ephemeral = StaticSecret::from(ephemeral_secret);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(recipient);
    let wrap_key =
        derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());

    let cipher = XChaCha20Poly1305::new((&*wrap_key).into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), content_key.as_slice())
        .map_err(|_| CryptoError::AeadFailure)?;

    Ok(KeyEnvelope { ephemeral_public: *ephemeral_public.as_bytes(), nonce, ciphertext })
}

/// Unwrap a content key with the recipient's X25519 secret.
///
/// Fails with [`CryptoError::AeadFailure`] on a wrong key or any tampering
/// with the envelope bytes.
pub fn open_content_key(
    recipient_secret: &StaticSecret,
    envelope: &KeyEnvelope,
) -> Result<[u8; CONTENT_KEY_SIZE], CryptoError> {
    let ephemeral_public = PublicKey::from(envelope.ephemeral_public);
    let recipient_public = PublicKey::from(recipient_secret);

    let shared = recipient_secret.diffie_hellman(&ephemeral_public);
    let wrap_key =
        derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_public.as_bytes());

    let cipher = XChaCha20Poly1305::new((&*wrap_key).into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::AeadFailure)?;

    let key: [u8; CONTENT_KEY_SIZE] =
        plaintext.as_slice().try_into().map_err(|_| CryptoError::EnvelopeFormat("bad key size"))?;
    Ok(key)
}

/// Derive the envelope wrap key from an ECDH shared secret.
///
/// The info string binds both public keys so an envelope cannot be
/// re-targeted to a different recipient.
fn derive_wrap_key(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
) -> Zeroizing<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);

    // Capacity: 19 (label) + 32 + 32 = 83
    let mut info = Vec::with_capacity(83);
    info.extend_from_slice(ENVELOPE_LABEL);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let mut key = Zeroizing::new([0u8; 32]);
    let Ok(()) = hkdf.expand(&info, key.as_mut()) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    key
}
