//! Access-token extraction for authenticated routes.
//!
//! Validation is stateless by default: signature + expiry + use marker,
//! no store read. With `--strict-revocation` it additionally consults the
//! family-revocation marker and the identity's suspension state, trading a
//! store lookup for the ability to kill issued access tokens early.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use alcove_core::Environment;

use crate::{error::ApiError, state::AppState, storage::DurableStore};

/// Verified caller identity extracted from a Bearer access token.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    /// Identity id from the token's `sub` claim.
    pub identity_id: Uuid,
    /// Fingerprint hex from the token.
    pub fingerprint: String,
    /// Refresh-token family the access token descends from.
    pub family_id: Uuid,
}

impl<S: DurableStore> FromRequestParts<AppState<S>> for AuthIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        let now = state.env.unix_now_secs();
        let claims = state.sessions.signer().verify(token, now).map_err(ApiError::from)?;

        if state.strict_revocation {
            if state.tracker.family_revoked(claims.fam).map_err(ApiError::from)? {
                tracing::warn!(family_id = %claims.fam, "access token from revoked family");
                return Err(ApiError::Unauthorized);
            }

            let identity = state.registry.lookup_id(claims.sub).map_err(ApiError::from)?;
            if identity.is_suspended(now) {
                return Err(ApiError::Unauthorized);
            }
        }

        Ok(AuthIdentity {
            identity_id: claims.sub,
            fingerprint: claims.fpr,
            family_id: claims.fam,
        })
    }
}
