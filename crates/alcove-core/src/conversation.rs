//! Conversations, key envelopes, and opaque message relay.
//!
//! The server's role in messaging is deliberately small: store one opaque
//! encrypted-key envelope per participant at creation time, then relay
//! ciphertext and nonce bytes unmodified. It validates structure (sizes,
//! participant membership) and authorization, never content - there is no
//! decryption key on this side of the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    env::Environment,
    error::AuthError,
    store::{ConversationStore, IdentityStore},
};

/// Maximum participants per conversation.
pub const MAX_PARTICIPANTS: usize = 64;

/// Maximum accepted ciphertext size in bytes.
pub const MAX_CIPHERTEXT_SIZE: usize = 64 * 1024;

/// Maximum accepted nonce size in bytes.
///
/// Generous enough for any standard AEAD (XChaCha20 uses 24); the server
/// does not interpret the value.
pub const MAX_NONCE_SIZE: usize = 32;

/// Maximum accepted envelope blob size in bytes.
pub const MAX_ENVELOPE_SIZE: usize = 256;

/// Default page size for message listing.
pub const DEFAULT_MESSAGE_PAGE: usize = 50;

/// A conversation between identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque handle.
    pub id: Uuid,
    /// Identity that created the conversation.
    pub creator_id: Uuid,
    /// Unix timestamp (seconds) of creation.
    pub created_at_secs: u64,
}

/// One participant's wrapped copy of the conversation content key.
///
/// Immutable once stored; adding a participant later means adding a new
/// envelope, never sharing an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEnvelope {
    /// Conversation this envelope belongs to.
    pub conversation_id: Uuid,
    /// The participant who can unwrap it.
    pub identity_id: Uuid,
    /// Opaque wrapped content key; the server cannot unwrap it.
    pub encrypted_key: Vec<u8>,
    /// Unix timestamp (seconds) when stored.
    pub created_at_secs: u64,
}

/// A stored end-to-end encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Opaque handle.
    pub id: Uuid,
    /// Conversation the message belongs to.
    pub conversation_id: Uuid,
    /// Sending participant.
    pub sender_id: Uuid,
    /// Opaque ciphertext bytes, relayed unmodified.
    pub ciphertext: Vec<u8>,
    /// Per-message AEAD nonce, relayed unmodified.
    pub nonce: Vec<u8>,
    /// Unix timestamp (seconds) when accepted.
    pub created_at_secs: u64,
}

/// Envelope supplied by the creating client for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeInput {
    /// Participant the envelope is sealed to.
    pub identity_id: Uuid,
    /// Wrapped content key bytes.
    pub encrypted_key: Vec<u8>,
}

/// Ciphertext + nonce pair for a message being submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Opaque ciphertext bytes.
    pub ciphertext: Vec<u8>,
    /// Per-message AEAD nonce.
    pub nonce: Vec<u8>,
}

/// Creates conversations with per-participant envelopes and relays
/// messages.
#[derive(Clone)]
pub struct ConversationService<E, CS, IS> {
    env: E,
    conversations: CS,
    identities: IS,
}

impl<E, CS, IS> ConversationService<E, CS, IS>
where
    E: Environment,
    CS: ConversationStore,
    IS: IdentityStore,
{
    /// Create a service over the given stores.
    pub fn new(env: E, conversations: CS, identities: IS) -> Self {
        Self { env, conversations, identities }
    }

    /// Create a conversation with one sealed envelope per participant.
    ///
    /// The creator is always a participant, listed or not. Requires every
    /// participant to exist and exactly one envelope per participant
    /// (including the creator's own) - the creating client seals them; the
    /// server only checks coverage and bounds, and stores the blobs
    /// opaquely. Conversation, envelopes, and the optional first message
    /// are inserted atomically.
    pub fn create_conversation(
        &self,
        creator_id: Uuid,
        participant_ids: &[Uuid],
        envelopes: Vec<EnvelopeInput>,
        initial_message: Option<NewMessage>,
    ) -> Result<Conversation, AuthError> {
        if participant_ids.is_empty() {
            return Err(AuthError::InvalidInput("at least one participant required"));
        }

        // Dedupe and pull the creator in
        let mut participants: Vec<Uuid> = Vec::with_capacity(participant_ids.len() + 1);
        participants.push(creator_id);
        for &id in participant_ids {
            if !participants.contains(&id) {
                participants.push(id);
            }
        }

        if participants.len() > MAX_PARTICIPANTS {
            return Err(AuthError::InvalidInput("too many participants"));
        }

        for &id in &participants {
            if self.identities.by_id(id)?.is_none() {
                return Err(AuthError::NotFound("participant"));
            }
        }

        // Exactly one envelope per participant, no extras, no duplicates
        if envelopes.len() != participants.len() {
            return Err(AuthError::InvalidInput("one key envelope required per participant"));
        }
        for envelope in &envelopes {
            if !participants.contains(&envelope.identity_id) {
                return Err(AuthError::InvalidInput("envelope for a non-participant"));
            }
            if envelopes.iter().filter(|e| e.identity_id == envelope.identity_id).count() > 1 {
                return Err(AuthError::InvalidInput("duplicate envelope for participant"));
            }
            if envelope.encrypted_key.is_empty()
                || envelope.encrypted_key.len() > MAX_ENVELOPE_SIZE
            {
                return Err(AuthError::InvalidInput("envelope size"));
            }
        }

        if let Some(message) = &initial_message {
            validate_message_bounds(&message.ciphertext, &message.nonce)?;
        }

        let now = self.env.unix_now_secs();
        let conversation =
            Conversation { id: self.env.random_uuid(), creator_id, created_at_secs: now };

        let envelope_records: Vec<ParticipantEnvelope> = envelopes
            .into_iter()
            .map(|e| ParticipantEnvelope {
                conversation_id: conversation.id,
                identity_id: e.identity_id,
                encrypted_key: e.encrypted_key,
                created_at_secs: now,
            })
            .collect();

        let first_message = initial_message.map(|m| MessageRecord {
            id: self.env.random_uuid(),
            conversation_id: conversation.id,
            sender_id: creator_id,
            ciphertext: m.ciphertext,
            nonce: m.nonce,
            created_at_secs: now,
        });

        self.conversations.insert_conversation(
            &conversation,
            &envelope_records,
            first_message.as_ref(),
        )?;

        tracing::info!(
            conversation_id = %conversation.id,
            participants = envelope_records.len(),
            "conversation created"
        );

        Ok(conversation)
    }

    /// Conversation detail with envelopes, readable by participants only.
    pub fn conversation(
        &self,
        id: Uuid,
        reader_id: Uuid,
    ) -> Result<(Conversation, Vec<ParticipantEnvelope>), AuthError> {
        let conversation =
            self.conversations.conversation(id)?.ok_or(AuthError::NotFound("conversation"))?;

        match self.conversations.is_participant(id, reader_id)? {
            Some(true) => {},
            Some(false) => return Err(AuthError::Forbidden),
            None => return Err(AuthError::NotFound("conversation")),
        }

        let envelopes = self.conversations.envelopes(id)?;
        Ok((conversation, envelopes))
    }

    /// Accept a message: authorization + structural checks, then store.
    ///
    /// Pure relay - the bytes are not interpreted, transformed, or
    /// decrypted, and they come back out exactly as they went in.
    pub fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
    ) -> Result<MessageRecord, AuthError> {
        match self.conversations.is_participant(conversation_id, sender_id)? {
            Some(true) => {},
            Some(false) => return Err(AuthError::Forbidden),
            None => return Err(AuthError::NotFound("conversation")),
        }

        validate_message_bounds(&ciphertext, &nonce)?;

        let message = MessageRecord {
            id: self.env.random_uuid(),
            conversation_id,
            sender_id,
            ciphertext,
            nonce,
            created_at_secs: self.env.unix_now_secs(),
        };

        self.conversations.insert_message(&message)?;

        Ok(message)
    }

    /// Page through a conversation's messages, oldest first.
    pub fn messages(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        from: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, AuthError> {
        match self.conversations.is_participant(conversation_id, reader_id)? {
            Some(true) => {},
            Some(false) => return Err(AuthError::Forbidden),
            None => return Err(AuthError::NotFound("conversation")),
        }

        Ok(self.conversations.messages(conversation_id, from, limit)?)
    }
}

/// Structural bounds shared by initial and subsequent messages.
fn validate_message_bounds(ciphertext: &[u8], nonce: &[u8]) -> Result<(), AuthError> {
    if ciphertext.is_empty() || ciphertext.len() > MAX_CIPHERTEXT_SIZE {
        return Err(AuthError::InvalidInput("ciphertext size"));
    }
    if nonce.is_empty() || nonce.len() > MAX_NONCE_SIZE {
        return Err(AuthError::InvalidInput("nonce size"));
    }
    Ok(())
}
