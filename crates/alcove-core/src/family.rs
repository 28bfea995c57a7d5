//! Refresh-token rotation, reuse detection, and family revocation.
//!
//! A presented refresh token rotates exactly once: the row flips
//! `Active -> Consumed` and a new `Active` child joins the same family in
//! one atomic store operation. Presenting a consumed token is treated as
//! theft - the entire family is revoked in a single bulk write and the
//! caller is told to sign in again. A stolen-and-used token thereby becomes
//! a tripwire: whichever of thief and victim rotates second kills the
//! session for both.

use uuid::Uuid;

use alcove_crypto::hash_token;

use crate::{
    env::Environment,
    error::AuthError,
    session::{SessionTokenService, SessionTokens},
    store::{IdentityStore, RefreshTokenStore},
    token::{RefreshTokenRecord, TokenState},
};

/// Governs every refresh after login: rotation, reuse, revocation.
#[derive(Clone)]
pub struct TokenFamilyTracker<E, TS, IS> {
    env: E,
    tokens: TS,
    identities: IS,
    sessions: SessionTokenService<E, TS>,
}

impl<E, TS, IS> TokenFamilyTracker<E, TS, IS>
where
    E: Environment,
    TS: RefreshTokenStore,
    IS: IdentityStore,
{
    /// Create a tracker sharing the session service's token store.
    pub fn new(env: E, tokens: TS, identities: IS, sessions: SessionTokenService<E, TS>) -> Self {
        Self { env, tokens, identities, sessions }
    }

    /// Rotate a presented refresh token.
    ///
    /// On success the presented token is consumed and a fresh pair in the
    /// same family is returned. The consume-and-insert is a single atomic
    /// store operation conditioned on the row still being `Active`; when
    /// the conditional update loses a race, the row is re-read fresh to
    /// decide between reuse and plain invalidity - never blindly retried.
    pub fn rotate(&self, presented: &str) -> Result<SessionTokens, AuthError> {
        let hash = hash_token(presented);
        let record = self.tokens.find_by_hash(&hash)?.ok_or(AuthError::TokenInvalid)?;

        let now = self.env.unix_now_secs();
        if record.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        match record.state {
            // Family already dead; indistinguishable from an unknown token
            TokenState::Revoked => Err(AuthError::TokenInvalid),

            // Replay of an already-rotated token: the anti-theft tripwire
            TokenState::Consumed => self.reuse_detected(&record),

            TokenState::Active => {
                let identity = self
                    .identities
                    .by_id(record.identity_id)?
                    .ok_or(AuthError::TokenInvalid)?;
                if identity.is_suspended(now) {
                    return Err(AuthError::Suspended);
                }

                let (tokens, child) = self.sessions.forge_in_family(&identity, record.family_id)?;

                if self.tokens.rotate(record.id, &child)? {
                    tracing::debug!(
                        identity_id = %record.identity_id,
                        family_id = %record.family_id,
                        "refresh token rotated"
                    );
                    return Ok(tokens);
                }

                // Lost the race: someone rotated or revoked this row since
                // we read it. Re-read and decide.
                match self.tokens.find_by_hash(&hash)? {
                    Some(current) if current.state == TokenState::Consumed => {
                        self.reuse_detected(&current)
                    },
                    _ => Err(AuthError::TokenInvalid),
                }
            },
        }
    }

    /// Revoke every token in a family (logout, reuse response).
    ///
    /// A single set-based bulk update: there is no window in which some
    /// siblings are revoked and others still accepted.
    pub fn revoke_family(&self, family_id: Uuid) -> Result<usize, AuthError> {
        let revoked = self.tokens.revoke_family(family_id)?;
        tracing::info!(family_id = %family_id, revoked, "token family revoked");
        Ok(revoked)
    }

    /// Revoke every family belonging to an identity ("sign out everywhere").
    pub fn revoke_all(&self, identity_id: Uuid) -> Result<usize, AuthError> {
        let revoked = self.tokens.revoke_all(identity_id)?;
        tracing::info!(identity_id = %identity_id, revoked, "all token families revoked");
        Ok(revoked)
    }

    /// Whether a family has been revoked.
    ///
    /// Strict deployments consult this during access-token validation to
    /// invalidate already-issued access tokens before natural expiry.
    pub fn family_revoked(&self, family_id: Uuid) -> Result<bool, AuthError> {
        Ok(self.tokens.family_revoked(family_id)?)
    }

    /// Explicit logout: revoke the family of the presented token.
    ///
    /// Accepts the token in any state - a client logging out with an
    /// already-consumed token still ends the session it belongs to.
    pub fn logout(&self, presented: &str) -> Result<(), AuthError> {
        let hash = hash_token(presented);
        let record = self.tokens.find_by_hash(&hash)?.ok_or(AuthError::TokenInvalid)?;
        self.revoke_family(record.family_id)?;
        Ok(())
    }

    /// Identity that owns a presented refresh token, if any.
    ///
    /// Used by the logout endpoint to bind "sign out everywhere" to the
    /// token's owner rather than trusting a caller-supplied id.
    pub fn owner_of(&self, presented: &str) -> Result<Uuid, AuthError> {
        let hash = hash_token(presented);
        let record = self.tokens.find_by_hash(&hash)?.ok_or(AuthError::TokenInvalid)?;
        Ok(record.identity_id)
    }

    /// Reuse response: revoke the family, then surface the incident.
    ///
    /// Never recovers silently; the error always reaches the caller.
    fn reuse_detected(&self, record: &RefreshTokenRecord) -> Result<SessionTokens, AuthError> {
        tracing::warn!(
            identity_id = %record.identity_id,
            family_id = %record.family_id,
            "refresh token reuse detected - revoking family"
        );
        self.tokens.revoke_family(record.family_id)?;
        Err(AuthError::TokenReuseDetected)
    }
}
