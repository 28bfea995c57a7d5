//! Single-use signing challenges.
//!
//! A login attempt starts by requesting a challenge for a fingerprint: 32
//! bytes of CSPRNG entropy, base64url-encoded, opaque to the client. The
//! client signs the exact challenge string with its secret key and submits
//! the signature. Verification consumes the challenge atomically, so a
//! verified challenge can never be replayed and two concurrent
//! verifications cannot both succeed.
//!
//! At most one challenge is outstanding per fingerprint: issuing a new one
//! supersedes the previous, which prevents stockpiling valid challenges.

use serde::{Deserialize, Serialize};

use alcove_crypto::{Fingerprint, encode_secret, verify_signature};

use crate::{
    env::Environment,
    error::AuthError,
    identity::Identity,
    store::{ChallengeStore, IdentityStore},
};

/// Default challenge validity window in seconds.
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;

/// An outstanding challenge record, keyed by fingerprint in the TTL store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Fingerprint this challenge was issued for.
    pub fingerprint: Fingerprint,
    /// Opaque nonce the client must sign (base64url of 32 random bytes).
    pub nonce: String,
    /// Unix timestamp (seconds) when the challenge was issued.
    pub issued_at_secs: u64,
    /// Unix timestamp (seconds) after which the challenge is rejected.
    pub expires_at_secs: u64,
}

/// What the caller receives from [`ChallengeIssuer::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    /// The nonce to sign.
    pub challenge: String,
    /// Expiry of the challenge as Unix seconds.
    pub expires_at_secs: u64,
}

/// Issues and verifies single-use signing challenges.
#[derive(Clone)]
pub struct ChallengeIssuer<E, CS, IS> {
    env: E,
    challenges: CS,
    identities: IS,
    ttl_secs: u64,
}

impl<E, CS, IS> ChallengeIssuer<E, CS, IS>
where
    E: Environment,
    CS: ChallengeStore,
    IS: IdentityStore,
{
    /// Create an issuer with the default challenge TTL.
    pub fn new(env: E, challenges: CS, identities: IS) -> Self {
        Self::with_ttl(env, challenges, identities, DEFAULT_CHALLENGE_TTL_SECS)
    }

    /// Create an issuer with an explicit challenge TTL.
    pub fn with_ttl(env: E, challenges: CS, identities: IS, ttl_secs: u64) -> Self {
        Self { env, challenges, identities, ttl_secs }
    }

    /// Issue a fresh challenge for a fingerprint.
    ///
    /// The identity must exist and not be suspended. Any prior outstanding
    /// challenge for the same fingerprint is superseded.
    pub fn issue(&self, fingerprint: &Fingerprint) -> Result<IssuedChallenge, AuthError> {
        let identity =
            self.identities.by_fingerprint(fingerprint)?.ok_or(AuthError::IdentityNotFound)?;

        let now = self.env.unix_now_secs();
        if identity.is_suspended(now) {
            return Err(AuthError::Suspended);
        }

        // Opportunistic sweep; the background task does the rest
        self.challenges.evict_expired(now)?;

        let mut secret = [0u8; 32];
        self.env.random_bytes(&mut secret);
        let nonce = encode_secret(&secret);

        let challenge = Challenge {
            fingerprint: *fingerprint,
            nonce: nonce.clone(),
            issued_at_secs: now,
            expires_at_secs: now + self.ttl_secs,
        };
        self.challenges.insert(&challenge)?;

        tracing::debug!(fingerprint = %fingerprint, "challenge issued");

        Ok(IssuedChallenge { challenge: nonce, expires_at_secs: challenge.expires_at_secs })
    }

    /// Verify a signed challenge response and consume the challenge.
    ///
    /// The signature must cover the exact challenge string bytes under the
    /// identity's registered public key. Consumption is an atomic
    /// compare-and-delete ordered after the signature check, so success is
    /// unrepeatable: the loser of a concurrent duplicate verification sees
    /// [`AuthError::ChallengeNotFound`]. An invalid signature leaves the
    /// challenge in place.
    ///
    /// Returns the verified identity so the caller can mint a session.
    pub fn verify(
        &self,
        fingerprint: &Fingerprint,
        challenge: &str,
        signature: &[u8],
    ) -> Result<Identity, AuthError> {
        let record = self.challenges.get(fingerprint)?.ok_or(AuthError::ChallengeNotFound)?;

        if record.nonce != challenge {
            // Superseded or fabricated nonce; indistinguishable from absent
            return Err(AuthError::ChallengeNotFound);
        }

        let now = self.env.unix_now_secs();
        if now >= record.expires_at_secs {
            return Err(AuthError::ChallengeExpired);
        }

        let identity =
            self.identities.by_fingerprint(fingerprint)?.ok_or(AuthError::IdentityNotFound)?;
        if identity.is_suspended(now) {
            return Err(AuthError::Suspended);
        }

        verify_signature(&identity.public_key, challenge.as_bytes(), signature)?;

        if !self.challenges.consume(fingerprint, challenge)? {
            return Err(AuthError::ChallengeNotFound);
        }

        tracing::debug!(identity_id = %identity.id, "challenge verified and consumed");

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;
    use crate::{identity::IdentityRegistry, store::MemoryStore, testing::FixedEnv};

    struct Fixture {
        env: FixedEnv,
        issuer: ChallengeIssuer<FixedEnv, MemoryStore, MemoryStore>,
        key: SigningKey,
        fingerprint: Fingerprint,
    }

    fn fixture() -> Fixture {
        let env = FixedEnv::new(10_000);
        let store = MemoryStore::new();
        let registry = IdentityRegistry::new(env.clone(), store.clone());

        let key = SigningKey::from_bytes(&[1u8; 32]);
        let identity = registry.register(&key.verifying_key().to_bytes(), None).unwrap();

        let issuer = ChallengeIssuer::new(env.clone(), store.clone(), store);
        Fixture { env, issuer, key, fingerprint: identity.fingerprint }
    }

    #[test]
    fn issue_and_verify_round_trips() {
        let f = fixture();
        let issued = f.issuer.issue(&f.fingerprint).unwrap();

        assert_eq!(issued.expires_at_secs, 10_000 + DEFAULT_CHALLENGE_TTL_SECS);

        let sig = f.key.sign(issued.challenge.as_bytes());
        f.issuer.verify(&f.fingerprint, &issued.challenge, &sig.to_bytes()).unwrap();
    }

    #[test]
    fn issue_for_unknown_identity_fails() {
        let f = fixture();
        let unknown = alcove_crypto::fingerprint(&[9u8; 32]);
        assert_eq!(f.issuer.issue(&unknown), Err(AuthError::IdentityNotFound));
    }

    #[test]
    fn challenge_is_single_use() {
        let f = fixture();
        let issued = f.issuer.issue(&f.fingerprint).unwrap();
        let sig = f.key.sign(issued.challenge.as_bytes()).to_bytes();

        f.issuer.verify(&f.fingerprint, &issued.challenge, &sig).unwrap();

        // Identical inputs the second time: challenge already consumed
        let second = f.issuer.verify(&f.fingerprint, &issued.challenge, &sig);
        assert_eq!(second, Err(AuthError::ChallengeNotFound));
    }

    #[test]
    fn new_challenge_supersedes_previous() {
        let f = fixture();
        let first = f.issuer.issue(&f.fingerprint).unwrap();
        let second = f.issuer.issue(&f.fingerprint).unwrap();
        assert_ne!(first.challenge, second.challenge);

        // Signature over the superseded challenge no longer verifies
        let sig = f.key.sign(first.challenge.as_bytes()).to_bytes();
        let result = f.issuer.verify(&f.fingerprint, &first.challenge, &sig);
        assert_eq!(result, Err(AuthError::ChallengeNotFound));

        // The fresh one still works
        let sig = f.key.sign(second.challenge.as_bytes()).to_bytes();
        f.issuer.verify(&f.fingerprint, &second.challenge, &sig).unwrap();
    }

    #[test]
    fn expired_challenge_rejected() {
        let f = fixture();
        let issued = f.issuer.issue(&f.fingerprint).unwrap();
        let sig = f.key.sign(issued.challenge.as_bytes()).to_bytes();

        f.env.advance(DEFAULT_CHALLENGE_TTL_SECS + 1);

        let result = f.issuer.verify(&f.fingerprint, &issued.challenge, &sig);
        assert_eq!(result, Err(AuthError::ChallengeExpired));
    }

    #[test]
    fn invalid_signature_rejected_and_challenge_survives() {
        let f = fixture();
        let issued = f.issuer.issue(&f.fingerprint).unwrap();

        let mut sig = f.key.sign(issued.challenge.as_bytes()).to_bytes();
        sig[10] ^= 0x40;

        let result = f.issuer.verify(&f.fingerprint, &issued.challenge, &sig);
        assert_eq!(result, Err(AuthError::InvalidSignature));

        // A correct signature afterwards still succeeds
        let good = f.key.sign(issued.challenge.as_bytes()).to_bytes();
        f.issuer.verify(&f.fingerprint, &issued.challenge, &good).unwrap();
    }

    #[test]
    fn wrong_keypair_rejected() {
        let f = fixture();
        let issued = f.issuer.issue(&f.fingerprint).unwrap();

        let other = SigningKey::from_bytes(&[2u8; 32]);
        let sig = other.sign(issued.challenge.as_bytes()).to_bytes();

        let result = f.issuer.verify(&f.fingerprint, &issued.challenge, &sig);
        assert_eq!(result, Err(AuthError::InvalidSignature));
    }

    #[test]
    fn suspended_identity_cannot_get_challenge() {
        let store = MemoryStore::new();
        let env = FixedEnv::new(10_000);
        let registry = IdentityRegistry::new(env.clone(), store.clone());

        let key = SigningKey::from_bytes(&[3u8; 32]);
        let identity = registry.register(&key.verifying_key().to_bytes(), None).unwrap();
        registry.suspend(identity.id, None).unwrap();

        let issuer = ChallengeIssuer::new(env, store.clone(), store);
        assert_eq!(issuer.issue(&identity.fingerprint), Err(AuthError::Suspended));
    }

    #[test]
    fn challenges_carry_distinct_nonces() {
        let f = fixture();
        let a = f.issuer.issue(&f.fingerprint).unwrap();
        let b = f.issuer.issue(&f.fingerprint).unwrap();
        assert_ne!(a.challenge, b.challenge);
        assert!(a.challenge.len() >= 43); // 32 bytes of entropy, base64url
    }
}
