//! Alcove Cryptographic Primitives
//!
//! Cryptographic building blocks for Alcove. Pure functions with
//! deterministic outputs. Callers provide random bytes for deterministic
//! testing.
//!
//! # Key Lifecycle
//!
//! Each identity is a single Ed25519 keypair held by the client. The server
//! only ever sees the public half and addresses the identity by its SHA-256
//! fingerprint. The same keypair serves two roles:
//!
//! ```text
//! Ed25519 keypair (client custody)
//!        │
//!        ├── signs login challenges ──► server verifies, never stores secrets
//!        │
//!        └── birational map to X25519
//!                │
//!                ▼
//!        ECDH shared secret ──► HKDF ──► envelope wrap key
//!                │
//!                ▼
//!        XChaCha20-Poly1305 ──► per-participant key envelope
//! ```
//!
//! A conversation's symmetric content key is wrapped once per participant
//! into an opaque envelope. The server stores envelopes and ciphertext; it
//! holds no secret material and cannot unwrap anything.
//!
//! # Security
//!
//! - Fingerprints are one-way: SHA-256 over the raw public key bytes
//! - Challenge signatures bind the exact challenge bytes to the keypair
//! - Envelope wrapping uses a fresh ephemeral X25519 key per envelope, so
//!   two envelopes for the same content key never share ciphertext
//! - Refresh tokens are stored only as SHA-256 hashes; the plaintext leaves
//!   the server exactly once

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod fingerprint;
mod signing;
mod token;

pub use envelope::{
    CONTENT_KEY_SIZE, ENVELOPE_NONCE_SIZE, ENVELOPE_SIZE, KeyEnvelope, encryption_public_key,
    encryption_secret_key, open_content_key, seal_content_key,
};
pub use error::CryptoError;
pub use fingerprint::{FINGERPRINT_SIZE, Fingerprint, fingerprint};
pub use signing::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE, parse_public_key, verify_signature};
pub use token::{TOKEN_SECRET_SIZE, TokenHash, encode_secret, hash_token};
