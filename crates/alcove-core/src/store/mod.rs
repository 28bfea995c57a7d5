//! Storage abstraction for the Alcove core.
//!
//! Trait-based, synchronous store interfaces. Every concurrency-critical
//! step the protocol needs (challenge consumption, token rotation, family
//! revocation) is a single trait method, so implementations carry the
//! atomicity - one mutex hold in memory, one write transaction in a
//! durable backend - and callers never compose a racy read-then-write.

mod error;
mod memory;

use uuid::Uuid;

pub use error::StoreError;
pub use memory::MemoryStore;

use alcove_crypto::{Fingerprint, TokenHash};

use crate::{
    challenge::Challenge,
    conversation::{Conversation, MessageRecord, ParticipantEnvelope},
    identity::Identity,
    token::RefreshTokenRecord,
};

/// Ephemeral TTL store for outstanding challenges.
///
/// Must be Clone (shared across services), Send + Sync, and synchronous.
/// Implementations typically share internal state via Arc, so clones
/// access the same underlying records.
pub trait ChallengeStore: Clone + Send + Sync + 'static {
    /// Store a challenge, REPLACING any prior one for the same
    /// fingerprint.
    ///
    /// The replacement is what enforces "at most one outstanding challenge
    /// per fingerprint".
    fn insert(&self, challenge: &Challenge) -> Result<(), StoreError>;

    /// Outstanding challenge for a fingerprint, if any.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Challenge>, StoreError>;

    /// Atomic compare-and-delete: remove the challenge iff the stored
    /// nonce equals `nonce`.
    ///
    /// Returns `true` exactly once per stored challenge - the loser of a
    /// concurrent race gets `false` even when both calls carry the right
    /// nonce.
    fn consume(&self, fingerprint: &Fingerprint, nonce: &str) -> Result<bool, StoreError>;

    /// Drop every challenge whose expiry is at or before `now_secs`.
    ///
    /// Returns the number of evicted records.
    fn evict_expired(&self, now_secs: u64) -> Result<usize, StoreError>;
}

/// Durable store for identity rows.
pub trait IdentityStore: Clone + Send + Sync + 'static {
    /// Insert a new identity.
    ///
    /// Returns `false` when the fingerprint is already taken - uniqueness
    /// must be checked and the row inserted atomically.
    fn insert(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// Identity by fingerprint. `None` if unknown.
    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Identity>, StoreError>;

    /// Identity by opaque id. `None` if unknown.
    fn by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Overwrite an existing identity row.
    ///
    /// Returns `false` if no row with this id exists. The fingerprint of
    /// an identity never changes, so the uniqueness index is untouched.
    fn update(&self, identity: &Identity) -> Result<bool, StoreError>;
}

/// Durable store for refresh-token rows.
pub trait RefreshTokenStore: Clone + Send + Sync + 'static {
    /// Insert a new token row (first token of a family).
    fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Token row by hash of the presented plaintext. `None` if unknown.
    fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Atomic rotation: consume the parent and insert its child.
    ///
    /// Iff the row `parent_id` exists and is currently `Active`, mark it
    /// `Consumed` and insert `child` - all in one operation. Returns
    /// `false` (changing nothing) otherwise. Two concurrent calls for the
    /// same parent can never both return `true`.
    fn rotate(&self, parent_id: Uuid, child: &RefreshTokenRecord) -> Result<bool, StoreError>;

    /// Mark every row in a family `Revoked` in one bulk update.
    ///
    /// Returns the number of rows whose state changed. Visible to all
    /// subsequent reads immediately - no partially-revoked window.
    fn revoke_family(&self, family_id: Uuid) -> Result<usize, StoreError>;

    /// Mark every row belonging to an identity `Revoked` in one bulk
    /// update. Returns the number of rows whose state changed.
    fn revoke_all(&self, identity_id: Uuid) -> Result<usize, StoreError>;

    /// Whether any row of this family is `Revoked`.
    ///
    /// Once true, stays true: `Revoked` is terminal.
    fn family_revoked(&self, family_id: Uuid) -> Result<bool, StoreError>;

    /// Garbage-collect rows past their expiry, in any state.
    ///
    /// Returns the number of removed rows.
    fn evict_expired(&self, now_secs: u64) -> Result<usize, StoreError>;
}

/// Durable store for conversations, envelopes, and messages.
pub trait ConversationStore: Clone + Send + Sync + 'static {
    /// Insert a conversation, its envelopes, and an optional first
    /// message atomically.
    ///
    /// Either everything lands or nothing does - a conversation without
    /// envelopes must never be observable.
    fn insert_conversation(
        &self,
        conversation: &Conversation,
        envelopes: &[ParticipantEnvelope],
        first_message: Option<&MessageRecord>,
    ) -> Result<(), StoreError>;

    /// Conversation by id. `None` if unknown.
    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// All envelopes of a conversation.
    fn envelopes(&self, conversation_id: Uuid) -> Result<Vec<ParticipantEnvelope>, StoreError>;

    /// Whether `identity_id` participates in the conversation.
    ///
    /// `None` when the conversation itself does not exist.
    fn is_participant(
        &self,
        conversation_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<bool>, StoreError>;

    /// Append a message to a conversation.
    fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError>;

    /// Load messages in range `[from, from+limit)`, oldest first.
    ///
    /// If fewer than `limit` messages exist, returns all available.
    fn messages(
        &self,
        conversation_id: Uuid,
        from: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}
