//! Shared application state wiring the core services to a storage backend.

use std::time::Duration;

use alcove_core::{
    AccessTokenSigner, ChallengeIssuer, ConversationService, IdentityRegistry, MemoryStore,
    SessionTokenService, TokenFamilyTracker,
    store::{ChallengeStore, RefreshTokenStore},
};

use crate::{config::RuntimeConfig, storage::DurableStore, system_env::SystemEnv};

/// Application state shared by every handler.
///
/// Generic over the durable backend `S` (in-memory or redb); challenges
/// always live in the ephemeral in-memory TTL store. Clones are cheap -
/// stores share state through `Arc`.
#[derive(Clone)]
pub struct AppState<S: DurableStore> {
    /// Production environment (system clock + OS RNG).
    pub env: SystemEnv,
    /// Durable backend, kept for maintenance sweeps.
    pub store: S,
    /// Ephemeral challenge store.
    pub challenges: MemoryStore,
    /// Identity registration and lookup.
    pub registry: IdentityRegistry<SystemEnv, S>,
    /// Challenge issuance and verification.
    pub issuer: ChallengeIssuer<SystemEnv, MemoryStore, S>,
    /// Session minting after successful verification.
    pub sessions: SessionTokenService<SystemEnv, S>,
    /// Refresh rotation, reuse detection, revocation.
    pub tracker: TokenFamilyTracker<SystemEnv, S, S>,
    /// Conversation creation and message relay.
    pub conversations: ConversationService<SystemEnv, S, S>,
    /// Whether access-token validation consults revocation/suspension.
    pub strict_revocation: bool,
}

impl<S: DurableStore> AppState<S> {
    /// Wire up services over a backend with a resolved signing secret.
    pub fn new(config: &RuntimeConfig, env: SystemEnv, store: S, jwt_secret: &[u8]) -> Self {
        let challenges = MemoryStore::new();

        let registry = IdentityRegistry::new(env.clone(), store.clone());
        let issuer = ChallengeIssuer::with_ttl(
            env.clone(),
            challenges.clone(),
            store.clone(),
            config.challenge_ttl_secs,
        );

        let signer = AccessTokenSigner::new(jwt_secret, config.access_ttl_secs);
        let sessions = SessionTokenService::with_refresh_ttl(
            env.clone(),
            store.clone(),
            signer,
            config.refresh_ttl_secs,
        );
        let tracker =
            TokenFamilyTracker::new(env.clone(), store.clone(), store.clone(), sessions.clone());
        let conversations = ConversationService::new(env.clone(), store.clone(), store.clone());

        Self {
            env,
            store,
            challenges,
            registry,
            issuer,
            sessions,
            tracker,
            conversations,
            strict_revocation: config.strict_revocation,
        }
    }

    /// Spawn the periodic sweep of expired challenges and token rows.
    ///
    /// Lazy eviction on challenge issue covers the hot path; this task
    /// bounds the stores between logins.
    pub fn spawn_maintenance(&self, interval_secs: u64) {
        let env = self.env.clone();
        let challenges = self.challenges.clone();
        let tokens = self.store.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                let now = alcove_core::Environment::unix_now_secs(&env);

                if let Err(e) = ChallengeStore::evict_expired(&challenges, now) {
                    tracing::warn!(error = %e, "challenge sweep failed");
                }

                match RefreshTokenStore::evict_expired(&tokens, now) {
                    Ok(evicted) if evicted > 0 => {
                        tracing::debug!(evicted, "expired refresh tokens swept");
                    },
                    Err(e) => tracing::warn!(error = %e, "token sweep failed"),
                    Ok(_) => {},
                }
            }
        });
    }
}
