//! Authentication endpoints: register, challenge, login, refresh, logout.

use axum::{Json, extract::State, http::StatusCode};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alcove_core::Identity;
use alcove_crypto::Fingerprint;

use crate::{
    error::{ApiError, ApiResult},
    extract::AuthIdentity,
    state::AppState,
    storage::DurableStore,
};

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Base64-encoded Ed25519 public key (32 bytes).
    pub public_key: String,
    /// Optional display name.
    pub display_name: Option<String>,
}

/// Identity as exposed over the API.
#[derive(Debug, Serialize)]
pub struct IdentityBody {
    /// Opaque identity handle.
    pub id: Uuid,
    /// Fingerprint hex.
    pub fingerprint: String,
    /// Display name, if set.
    pub display_name: Option<String>,
    /// Reputation score.
    pub karma: i64,
    /// Unix seconds of registration.
    pub created_at: u64,
}

impl From<Identity> for IdentityBody {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            fingerprint: identity.fingerprint.to_hex(),
            display_name: identity.display_name,
            karma: identity.karma,
            created_at: identity.created_at_secs,
        }
    }
}

/// Registration response body.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// The newly created identity.
    pub identity: IdentityBody,
}

/// Register a new identity with an Ed25519 public key.
pub async fn register<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let public_key = BASE64
        .decode(&request.public_key)
        .map_err(|_| ApiError::InvalidInput("public key encoding".to_string()))?;

    let identity = state.registry.register(&public_key, request.display_name)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { identity: identity.into() })))
}

/// Challenge request body.
#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    /// Fingerprint hex of the identity to authenticate.
    pub fingerprint: String,
}

/// Challenge response body.
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    /// Opaque nonce to sign.
    pub challenge: String,
    /// Unix seconds after which the challenge is rejected.
    pub expires_at: u64,
}

/// Get a signing challenge for authentication.
pub async fn challenge<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<ChallengeRequest>,
) -> ApiResult<Json<ChallengeResponse>> {
    let fingerprint = parse_fingerprint(&request.fingerprint)?;

    let issued = state.issuer.issue(&fingerprint)?;

    Ok(Json(ChallengeResponse {
        challenge: issued.challenge,
        expires_at: issued.expires_at_secs,
    }))
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Fingerprint hex of the authenticating identity.
    pub fingerprint: String,
    /// The challenge string exactly as issued.
    pub challenge: String,
    /// Base64-encoded Ed25519 signature over the challenge bytes.
    pub signature: String,
}

/// Session response body, shared by login and refresh.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Signed access token.
    pub access_token: String,
    /// Opaque refresh token, shown exactly once.
    pub refresh_token: String,
    /// Always "Bearer".
    pub token_type: &'static str,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

/// Login with a signed challenge response.
pub async fn login<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let fingerprint = parse_fingerprint(&request.fingerprint)?;

    let signature =
        BASE64.decode(&request.signature).map_err(|_| ApiError::Unauthorized)?;

    let identity = state.issuer.verify(&fingerprint, &request.challenge, &signature)?;
    let tokens = state.sessions.issue_session(&identity)?;

    Ok(Json(SessionResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer",
        expires_in: tokens.expires_in,
    }))
}

/// Refresh request body.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// The refresh-token plaintext from the previous session response.
    pub refresh_token: String,
}

/// Rotate a refresh token.
///
/// A replayed token trips reuse detection: the whole family is revoked and
/// the client must sign in again.
pub async fn refresh<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let tokens = state.tracker.rotate(&request.refresh_token)?;

    Ok(Json(SessionResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer",
        expires_in: tokens.expires_in,
    }))
}

/// Logout request body.
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    /// The current refresh token; its family is revoked.
    pub refresh_token: String,
    /// Revoke every family of the caller ("sign out everywhere").
    #[serde(default)]
    pub everywhere: bool,
}

/// Revoke the caller's session(s).
pub async fn logout<S: DurableStore>(
    State(state): State<AppState<S>>,
    auth: AuthIdentity,
    Json(request): Json<LogoutRequest>,
) -> ApiResult<StatusCode> {
    // The presented refresh token must belong to the authenticated caller;
    // logout is not a vector for revoking someone else's sessions
    let owner = state.tracker.owner_of(&request.refresh_token)?;
    if owner != auth.identity_id {
        tracing::warn!(
            caller = %auth.identity_id,
            "logout presented a refresh token owned by another identity"
        );
        return Err(ApiError::Unauthorized);
    }

    if request.everywhere {
        state.tracker.revoke_all(auth.identity_id)?;
    } else {
        state.tracker.logout(&request.refresh_token)?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Parse a fingerprint, collapsing parse failures into the generic
/// unauthorized response (a malformed fingerprint reveals nothing).
fn parse_fingerprint(hex: &str) -> Result<Fingerprint, ApiError> {
    hex.parse().map_err(|_| ApiError::Unauthorized)
}
