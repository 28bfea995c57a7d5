//! Refresh-token records and the per-token state machine.
//!
//! Every refresh token belongs to a family: the set of tokens descending
//! from one successful login. Normal use walks `Active -> Consumed` on each
//! rotation; `Revoked` is terminal and is entered by logout or reuse
//! detection. The state machine is a tagged enum with explicit transition
//! methods so an illegal transition (`Revoked -> Active`) cannot be
//! expressed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alcove_crypto::TokenHash;

/// Lifecycle state of a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    /// Usable exactly once for rotation.
    Active,
    /// Rotated away; presenting it again is reuse.
    Consumed,
    /// Terminal. Nothing in a revoked family is ever accepted again.
    Revoked,
}

impl TokenState {
    /// Normal rotation: `Active -> Consumed`.
    ///
    /// Returns `None` from any other state - a consumed or revoked token
    /// cannot be consumed again.
    pub fn consume(self) -> Option<Self> {
        match self {
            Self::Active => Some(Self::Consumed),
            Self::Consumed | Self::Revoked => None,
        }
    }

    /// Revocation: any state maps to `Revoked`.
    ///
    /// Idempotent; revoking a revoked token is a no-op.
    pub fn revoke(self) -> Self {
        Self::Revoked
    }

    /// Whether this token can still rotate.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether this token is terminally dead.
    pub fn is_revoked(self) -> bool {
        matches!(self, Self::Revoked)
    }
}

/// A stored refresh token.
///
/// The plaintext token value never appears here - only its SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Row identifier.
    pub id: Uuid,
    /// Identity this token authenticates.
    pub identity_id: Uuid,
    /// SHA-256 of the plaintext token; the lookup key.
    pub token_hash: TokenHash,
    /// Family shared by every token descending from one login.
    pub family_id: Uuid,
    /// Current lifecycle state.
    pub state: TokenState,
    /// Unix timestamp (seconds) when the row was created.
    pub created_at_secs: u64,
    /// Unix timestamp (seconds) after which the token is rejected.
    pub expires_at_secs: u64,
}

impl RefreshTokenRecord {
    /// Whether the token is past its expiry at `now_secs`.
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at_secs
    }
}
