//! Access-token signing and session issuance.
//!
//! A session is a pair: a stateless signed access token (minutes-scale,
//! verifiable offline by any collaborator holding the signing secret) and
//! an opaque refresh token (high-entropy random value whose hash alone is
//! persisted). A new login always opens a new token family; rotation stays
//! within the family it started in.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alcove_crypto::hash_token;

use crate::{
    env::Environment, error::AuthError, identity::Identity, store::RefreshTokenStore,
    token::RefreshTokenRecord, token::TokenState,
};

/// Default access-token lifetime in seconds (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 900;

/// Default refresh-token lifetime in seconds (30 days).
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Claim value marking a token as an access token.
const TOKEN_USE_ACCESS: &str = "access";

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Identity id the token authenticates.
    pub sub: Uuid,
    /// Fingerprint of the identity's public key (hex).
    pub fpr: String,
    /// Refresh-token family this access token descends from.
    ///
    /// Lets strict deployments reject access tokens from revoked families
    /// before their natural expiry.
    pub fam: Uuid,
    /// Token identifier for log correlation.
    pub jti: String,
    /// Issued-at, Unix seconds.
    pub iat: u64,
    /// Expiry, Unix seconds.
    pub exp: u64,
    /// Token use marker; always `"access"`.
    pub typ: String,
}

/// Signs and verifies stateless access tokens (HS256).
///
/// Verification needs no database round trip: signature + expiry + use
/// marker. Collaborating services share the signing secret.
#[derive(Clone)]
pub struct AccessTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl AccessTokenSigner {
    /// Create a signer from a shared secret.
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked against the Environment clock, not the system
        // clock, so verification stays deterministic under simulation
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    /// Access-token lifetime in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mint an access token for an identity within a family.
    pub fn mint(
        &self,
        now_secs: u64,
        jti: String,
        identity: &Identity,
        family_id: Uuid,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: identity.id,
            fpr: identity.fingerprint.to_hex(),
            fam: family_id,
            jti,
            iat: now_secs,
            exp: now_secs + self.ttl_secs,
            typ: TOKEN_USE_ACCESS.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }

    /// Verify a presented access token and return its claims.
    ///
    /// Checks signature, token-use marker, and expiry against `now_secs`.
    /// Collapses every verification failure except expiry into
    /// [`AuthError::TokenInvalid`].
    pub fn verify(&self, token: &str, now_secs: u64) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::TokenInvalid)?;

        if data.claims.typ != TOKEN_USE_ACCESS {
            return Err(AuthError::TokenInvalid);
        }

        if now_secs >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(data.claims)
    }
}

/// A freshly minted session: what the client receives.
///
/// The refresh-token plaintext exists only here; the server keeps its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Signed access token.
    pub access_token: String,
    /// Opaque refresh token, shown exactly once.
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

/// Mints session token pairs after successful challenge verification.
#[derive(Clone)]
pub struct SessionTokenService<E, TS> {
    env: E,
    tokens: TS,
    signer: AccessTokenSigner,
    refresh_ttl_secs: u64,
}

impl<E: Environment, TS: RefreshTokenStore> SessionTokenService<E, TS> {
    /// Create a service with the default refresh TTL.
    pub fn new(env: E, tokens: TS, signer: AccessTokenSigner) -> Self {
        Self::with_refresh_ttl(env, tokens, signer, DEFAULT_REFRESH_TTL_SECS)
    }

    /// Create a service with an explicit refresh TTL.
    pub fn with_refresh_ttl(
        env: E,
        tokens: TS,
        signer: AccessTokenSigner,
        refresh_ttl_secs: u64,
    ) -> Self {
        Self { env, tokens, signer, refresh_ttl_secs }
    }

    /// The signer used for access tokens.
    pub fn signer(&self) -> &AccessTokenSigner {
        &self.signer
    }

    /// Open a new session for a verified identity.
    ///
    /// Generates a fresh family: a new login is always a new family,
    /// distinct from any rotation.
    pub fn issue_session(&self, identity: &Identity) -> Result<SessionTokens, AuthError> {
        let family_id = self.env.random_uuid();
        let (tokens, record) = self.forge_in_family(identity, family_id)?;

        self.tokens.insert(&record)?;

        tracing::info!(
            identity_id = %identity.id,
            family_id = %family_id,
            "session issued"
        );

        Ok(tokens)
    }

    /// Build a token pair and its storage record within an existing family.
    ///
    /// Used by rotation: the caller is responsible for persisting the
    /// record atomically with whatever state change motivated it.
    pub(crate) fn forge_in_family(
        &self,
        identity: &Identity,
        family_id: Uuid,
    ) -> Result<(SessionTokens, RefreshTokenRecord), AuthError> {
        let now = self.env.unix_now_secs();

        let jti = hex::encode(self.env.random_u128().to_be_bytes());
        let access_token = self.signer.mint(now, jti, identity, family_id)?;

        let mut secret = [0u8; 32];
        self.env.random_bytes(&mut secret);
        let refresh_token = alcove_crypto::encode_secret(&secret);

        let record = RefreshTokenRecord {
            id: self.env.random_uuid(),
            identity_id: identity.id,
            token_hash: hash_token(&refresh_token),
            family_id,
            state: TokenState::Active,
            created_at_secs: now,
            expires_at_secs: now + self.refresh_ttl_secs,
        };

        let tokens =
            SessionTokens { access_token, refresh_token, expires_in: self.signer.ttl_secs() };

        Ok((tokens, record))
    }
}
