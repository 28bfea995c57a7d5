//! Alcove protocol core.
//!
//! Pseudonymous identity authentication and end-to-end encrypted
//! conversation plumbing. Identities are Ed25519 keypairs held by clients;
//! the server stores only public keys and addresses identities by
//! fingerprint. Authentication is challenge-response: the client proves key
//! possession by signing a single-use nonce, and receives a short-lived
//! signed access token plus an opaque rotating refresh token.
//!
//! # Architecture
//!
//! Services are thin state machines over explicit store traits
//! ([`store::ChallengeStore`], [`store::IdentityStore`],
//! [`store::RefreshTokenStore`], [`store::ConversationStore`]) and an
//! [`env::Environment`] that supplies time and randomness. All
//! concurrency-critical steps (challenge consumption, token rotation,
//! family revocation) are single atomic store operations, so two racing
//! callers can never both succeed.
//!
//! # Components
//!
//! - [`identity::IdentityRegistry`]: registration and lookup by fingerprint
//! - [`challenge::ChallengeIssuer`]: single-use signing challenges
//! - [`session::SessionTokenService`]: access + refresh token minting
//! - [`family::TokenFamilyTracker`]: rotation, reuse detection, revocation
//! - [`conversation::ConversationService`]: envelope distribution and
//!   opaque message relay

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod challenge;
pub mod conversation;
pub mod env;
mod error;
pub mod family;
pub mod identity;
pub mod session;
pub mod store;
pub mod testing;
pub mod token;

pub use challenge::{Challenge, ChallengeIssuer, DEFAULT_CHALLENGE_TTL_SECS, IssuedChallenge};
pub use conversation::{
    Conversation, ConversationService, EnvelopeInput, MessageRecord, NewMessage,
    ParticipantEnvelope,
};
pub use env::Environment;
pub use error::AuthError;
pub use family::TokenFamilyTracker;
pub use identity::{Identity, IdentityRegistry, MAX_DISPLAY_NAME_LEN};
pub use session::{
    AccessClaims, AccessTokenSigner, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS,
    SessionTokenService, SessionTokens,
};
pub use store::{MemoryStore, StoreError};
pub use token::{RefreshTokenRecord, TokenState};
