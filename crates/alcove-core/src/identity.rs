//! Identity records and the fingerprint-keyed registry.
//!
//! An identity is created once per public key and never physically
//! deleted; moderation soft-suspends it so authored content keeps a valid
//! owner. The fingerprint is a bijective handle: registering the same key
//! twice is rejected, and every later lookup resolves through it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alcove_crypto::{Fingerprint, fingerprint, parse_public_key};

use crate::{env::Environment, error::AuthError, store::IdentityStore};

/// Maximum accepted display-name length in bytes.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// A registered pseudonymous identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque server-assigned handle.
    pub id: Uuid,
    /// Raw Ed25519 public key.
    pub public_key: [u8; 32],
    /// SHA-256 fingerprint of `public_key`; unique across identities.
    pub fingerprint: Fingerprint,
    /// Optional human-readable name; carries no uniqueness guarantee.
    pub display_name: Option<String>,
    /// Accumulated reputation score.
    pub karma: i64,
    /// Soft-suspension flag; suspended identities cannot authenticate.
    pub suspended: bool,
    /// When set, the suspension lapses at this time.
    pub suspended_until_secs: Option<u64>,
    /// Unix timestamp (seconds) when the identity was registered.
    pub created_at_secs: u64,
}

impl Identity {
    /// Whether the identity is suspended at `now_secs`.
    ///
    /// A suspension without expiry is indefinite; one with an expiry
    /// lapses once the expiry passes.
    pub fn is_suspended(&self, now_secs: u64) -> bool {
        self.suspended && self.suspended_until_secs.is_none_or(|until| now_secs < until)
    }
}

/// Registry of identities keyed by public-key fingerprint.
///
/// The store enforces fingerprint uniqueness atomically, so concurrent
/// registrations of the same key cannot both succeed.
#[derive(Clone)]
pub struct IdentityRegistry<E, S> {
    env: E,
    store: S,
}

impl<E: Environment, S: IdentityStore> IdentityRegistry<E, S> {
    /// Create a registry over the given store.
    pub fn new(env: E, store: S) -> Self {
        Self { env, store }
    }

    /// Register a new identity for a public key.
    ///
    /// Validates the key bytes, derives the fingerprint, and inserts the
    /// row. Fails with [`AuthError::DuplicateFingerprint`] if the
    /// fingerprint is already taken - replaying a registration cannot
    /// create a second identity.
    pub fn register(
        &self,
        public_key: &[u8],
        display_name: Option<String>,
    ) -> Result<Identity, AuthError> {
        let key = parse_public_key(public_key)?;

        if let Some(name) = &display_name {
            if name.is_empty() || name.len() > MAX_DISPLAY_NAME_LEN {
                return Err(AuthError::InvalidInput("display name length"));
            }
        }

        let identity = Identity {
            id: self.env.random_uuid(),
            public_key: key.to_bytes(),
            fingerprint: fingerprint(public_key),
            display_name,
            karma: 0,
            suspended: false,
            suspended_until_secs: None,
            created_at_secs: self.env.unix_now_secs(),
        };

        if !self.store.insert(&identity)? {
            return Err(AuthError::DuplicateFingerprint);
        }

        tracing::info!(
            identity_id = %identity.id,
            fingerprint = %identity.fingerprint,
            "identity registered"
        );

        Ok(identity)
    }

    /// Look up an identity by fingerprint.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Identity, AuthError> {
        self.store.by_fingerprint(fingerprint)?.ok_or(AuthError::IdentityNotFound)
    }

    /// Look up an identity by its opaque id.
    pub fn lookup_id(&self, id: Uuid) -> Result<Identity, AuthError> {
        self.store.by_id(id)?.ok_or(AuthError::IdentityNotFound)
    }

    /// Update the display name of an existing identity.
    pub fn set_display_name(
        &self,
        id: Uuid,
        display_name: Option<String>,
    ) -> Result<Identity, AuthError> {
        if let Some(name) = &display_name {
            if name.is_empty() || name.len() > MAX_DISPLAY_NAME_LEN {
                return Err(AuthError::InvalidInput("display name length"));
            }
        }

        let mut identity = self.lookup_id(id)?;
        identity.display_name = display_name;

        if !self.store.update(&identity)? {
            return Err(AuthError::IdentityNotFound);
        }

        Ok(identity)
    }

    /// Suspend an identity, optionally until a given time.
    ///
    /// Suspension blocks challenge issuance, login, and token rotation
    /// but never deletes the row.
    pub fn suspend(&self, id: Uuid, until_secs: Option<u64>) -> Result<(), AuthError> {
        let mut identity = self.lookup_id(id)?;
        identity.suspended = true;
        identity.suspended_until_secs = until_secs;

        if !self.store.update(&identity)? {
            return Err(AuthError::IdentityNotFound);
        }

        tracing::warn!(identity_id = %id, until = ?until_secs, "identity suspended");
        Ok(())
    }

    /// Lift a suspension.
    pub fn reinstate(&self, id: Uuid) -> Result<(), AuthError> {
        let mut identity = self.lookup_id(id)?;
        identity.suspended = false;
        identity.suspended_until_secs = None;

        if !self.store.update(&identity)? {
            return Err(AuthError::IdentityNotFound);
        }

        Ok(())
    }
}
