#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use uuid::Uuid;

use alcove_crypto::{Fingerprint, TokenHash};

use super::{
    ChallengeStore, ConversationStore, IdentityStore, RefreshTokenStore, StoreError,
};
use crate::{
    challenge::Challenge,
    conversation::{Conversation, MessageRecord, ParticipantEnvelope},
    identity::Identity,
    token::RefreshTokenRecord,
};

/// In-memory store implementing every store trait.
///
/// Uses `HashMap` for lookups plus explicit uniqueness indexes. All state
/// is wrapped in Arc<Mutex<>> to allow Clone and concurrent access; each
/// trait method takes the lock once, which is what makes consume, rotate,
/// and bulk revocation atomic. Thread-safe through Mutex, but uses
/// `lock().expect()` which will panic if the mutex is poisoned -
/// acceptable for the default backend and tests.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    /// Identity rows by id
    identities: HashMap<Uuid, Identity>,

    /// Fingerprint -> identity id uniqueness index
    fingerprints: HashMap<Fingerprint, Uuid>,

    /// Outstanding challenges, at most one per fingerprint
    challenges: HashMap<Fingerprint, Challenge>,

    /// Refresh-token rows by id
    tokens: HashMap<Uuid, RefreshTokenRecord>,

    /// Token hash -> row id lookup index
    token_hashes: HashMap<TokenHash, Uuid>,

    /// Conversations by id
    conversations: HashMap<Uuid, Conversation>,

    /// Envelopes per conversation
    envelopes: HashMap<Uuid, Vec<ParticipantEnvelope>>,

    /// Messages per conversation, in arrival order
    messages: HashMap<Uuid, Vec<MessageRecord>>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                identities: HashMap::new(),
                fingerprints: HashMap::new(),
                challenges: HashMap::new(),
                tokens: HashMap::new(),
                token_hashes: HashMap::new(),
                conversations: HashMap::new(),
                envelopes: HashMap::new(),
                messages: HashMap::new(),
            })),
        }
    }

    /// Number of outstanding challenges.
    ///
    /// Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock).
    #[allow(clippy::expect_used)]
    pub fn challenge_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").challenges.len()
    }

    /// Number of stored refresh-token rows.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn token_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").tokens.len()
    }

    /// Number of `Active` refresh tokens belonging to an identity.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn active_token_count(&self, identity_id: Uuid) -> usize {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner
            .tokens
            .values()
            .filter(|t| t.identity_id == identity_id && t.state.is_active())
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert(&self, challenge: &Challenge) -> Result<(), StoreError> {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .challenges
            .insert(challenge.fingerprint, challenge.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Challenge>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").challenges.get(fingerprint).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn consume(&self, fingerprint: &Fingerprint, nonce: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let matches = inner.challenges.get(fingerprint).is_some_and(|stored| stored.nonce == nonce);
        if matches {
            inner.challenges.remove(fingerprint);
        }
        Ok(matches)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn evict_expired(&self, now_secs: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let before = inner.challenges.len();
        inner.challenges.retain(|_, c| c.expires_at_secs > now_secs);
        Ok(before - inner.challenges.len())
    }
}

impl IdentityStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert(&self, identity: &Identity) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.fingerprints.contains_key(&identity.fingerprint) {
            return Ok(false);
        }

        inner.fingerprints.insert(identity.fingerprint, identity.id);
        inner.identities.insert(identity.id, identity.clone());
        Ok(true)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .fingerprints
            .get(fingerprint)
            .and_then(|id| inner.identities.get(id))
            .cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").identities.get(&id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn update(&self, identity: &Identity) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if !inner.identities.contains_key(&identity.id) {
            return Ok(false);
        }

        inner.identities.insert(identity.id, identity.clone());
        Ok(true)
    }
}

impl RefreshTokenStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.token_hashes.insert(record.token_hash, record.id);
        inner.tokens.insert(record.id, record.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.token_hashes.get(hash).and_then(|id| inner.tokens.get(id)).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn rotate(&self, parent_id: Uuid, child: &RefreshTokenRecord) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        // CAS: only an Active parent can be consumed
        let Some(parent) = inner.tokens.get_mut(&parent_id) else {
            return Ok(false);
        };
        let Some(consumed) = parent.state.consume() else {
            return Ok(false);
        };
        parent.state = consumed;

        inner.token_hashes.insert(child.token_hash, child.id);
        inner.tokens.insert(child.id, child.clone());
        Ok(true)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn revoke_family(&self, family_id: Uuid) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let mut revoked = 0;
        for token in inner.tokens.values_mut().filter(|t| t.family_id == family_id) {
            if !token.state.is_revoked() {
                token.state = token.state.revoke();
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn revoke_all(&self, identity_id: Uuid) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let mut revoked = 0;
        for token in inner.tokens.values_mut().filter(|t| t.identity_id == identity_id) {
            if !token.state.is_revoked() {
                token.state = token.state.revoke();
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn family_revoked(&self, family_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .tokens
            .values()
            .any(|t| t.family_id == family_id && t.state.is_revoked()))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn evict_expired(&self, now_secs: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let expired: Vec<(Uuid, TokenHash)> = inner
            .tokens
            .values()
            .filter(|t| t.is_expired(now_secs))
            .map(|t| (t.id, t.token_hash))
            .collect();

        for (id, hash) in &expired {
            inner.tokens.remove(id);
            inner.token_hashes.remove(hash);
        }
        Ok(expired.len())
    }
}

impl ConversationStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert_conversation(
        &self,
        conversation: &Conversation,
        envelopes: &[ParticipantEnvelope],
        first_message: Option<&MessageRecord>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        inner.conversations.insert(conversation.id, conversation.clone());
        inner.envelopes.insert(conversation.id, envelopes.to_vec());

        let messages = inner.messages.entry(conversation.id).or_default();
        if let Some(message) = first_message {
            messages.push(message.clone());
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").conversations.get(&id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn envelopes(&self, conversation_id: Uuid) -> Result<Vec<ParticipantEnvelope>, StoreError> {
        Ok(self
            .inner
            .lock()
            .expect("Mutex poisoned")
            .envelopes
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn is_participant(
        &self,
        conversation_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<bool>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        if !inner.conversations.contains_key(&conversation_id) {
            return Ok(None);
        }

        Ok(Some(
            inner
                .envelopes
                .get(&conversation_id)
                .is_some_and(|e| e.iter().any(|p| p.identity_id == identity_id)),
        ))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn messages(
        &self,
        conversation_id: Uuid,
        from: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let Some(messages) = inner.messages.get(&conversation_id) else {
            return Ok(Vec::new());
        };

        let start = from as usize;
        if start > messages.len() {
            return Ok(Vec::new());
        }
        let end = (start + limit).min(messages.len());

        Ok(messages[start..end].to_vec())
    }
}
