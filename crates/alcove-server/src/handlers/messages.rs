//! End-to-end encrypted messaging endpoints.
//!
//! The server stores envelopes and relays ciphertext; every byte of
//! content that passes through here is opaque.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alcove_core::{EnvelopeInput, MessageRecord, NewMessage, conversation::DEFAULT_MESSAGE_PAGE};

use crate::{
    error::{ApiError, ApiResult},
    extract::AuthIdentity,
    state::AppState,
    storage::DurableStore,
};

/// Upper bound on a single message-listing page.
const MAX_MESSAGE_PAGE: usize = 200;

/// Ciphertext + nonce pair as carried in JSON (base64).
#[derive(Debug, Deserialize, Serialize)]
pub struct MessagePayload {
    /// Base64 ciphertext bytes.
    pub ciphertext: String,
    /// Base64 per-message nonce.
    pub nonce: String,
}

impl MessagePayload {
    fn decode(&self) -> Result<NewMessage, ApiError> {
        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|_| ApiError::InvalidInput("ciphertext encoding".to_string()))?;
        let nonce = BASE64
            .decode(&self.nonce)
            .map_err(|_| ApiError::InvalidInput("nonce encoding".to_string()))?;
        Ok(NewMessage { ciphertext, nonce })
    }
}

/// Conversation creation request body.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Other participants (the creator is implicit).
    pub participant_ids: Vec<Uuid>,
    /// One base64 key envelope per participant, creator included. Sealed
    /// client-side; the server stores the blobs without unwrapping them.
    pub key_envelopes: HashMap<Uuid, String>,
    /// Optional first message, sent atomically with creation.
    pub initial_message: Option<MessagePayload>,
}

/// Conversation as exposed over the API.
#[derive(Debug, Serialize)]
pub struct ConversationBody {
    /// Opaque handle.
    pub id: Uuid,
    /// Creating identity.
    pub creator_id: Uuid,
    /// Unix seconds of creation.
    pub created_at: u64,
}

/// Conversation creation response body.
#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    /// The created conversation.
    pub conversation: ConversationBody,
}

/// Create a conversation with per-participant key envelopes.
pub async fn create_conversation<S: DurableStore>(
    State(state): State<AppState<S>>,
    auth: AuthIdentity,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<CreateConversationResponse>)> {
    let mut envelopes = Vec::with_capacity(request.key_envelopes.len());
    for (identity_id, blob) in &request.key_envelopes {
        let encrypted_key = BASE64
            .decode(blob)
            .map_err(|_| ApiError::InvalidInput("key envelope encoding".to_string()))?;
        envelopes.push(EnvelopeInput { identity_id: *identity_id, encrypted_key });
    }

    let initial_message = request.initial_message.as_ref().map(MessagePayload::decode).transpose()?;

    let conversation = state.conversations.create_conversation(
        auth.identity_id,
        &request.participant_ids,
        envelopes,
        initial_message,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation: ConversationBody {
                id: conversation.id,
                creator_id: conversation.creator_id,
                created_at: conversation.created_at_secs,
            },
        }),
    ))
}

/// A participant entry in the conversation detail view.
#[derive(Debug, Serialize)]
pub struct ParticipantBody {
    /// Participant identity.
    pub identity_id: Uuid,
    /// Fingerprint hex of the participant's key.
    pub fingerprint: String,
    /// Display name, if set.
    pub display_name: Option<String>,
    /// Base64 of this participant's key envelope.
    pub encrypted_key: String,
}

/// Conversation detail response body.
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    /// Opaque handle.
    pub id: Uuid,
    /// Creating identity.
    pub creator_id: Uuid,
    /// Unix seconds of creation.
    pub created_at: u64,
    /// Every participant with their envelope.
    pub participants: Vec<ParticipantBody>,
}

/// Fetch a conversation with its envelopes (participants only).
pub async fn conversation_detail<S: DurableStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    auth: AuthIdentity,
) -> ApiResult<Json<ConversationDetailResponse>> {
    let (conversation, envelopes) = state.conversations.conversation(id, auth.identity_id)?;

    let mut participants = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        let identity = state.registry.lookup_id(envelope.identity_id)?;
        participants.push(ParticipantBody {
            identity_id: envelope.identity_id,
            fingerprint: identity.fingerprint.to_hex(),
            display_name: identity.display_name,
            encrypted_key: BASE64.encode(&envelope.encrypted_key),
        });
    }

    Ok(Json(ConversationDetailResponse {
        id: conversation.id,
        creator_id: conversation.creator_id,
        created_at: conversation.created_at_secs,
        participants,
    }))
}

/// Message as exposed over the API.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    /// Opaque handle.
    pub id: Uuid,
    /// Conversation the message belongs to.
    pub conversation_id: Uuid,
    /// Sending identity.
    pub sender_id: Uuid,
    /// Base64 ciphertext, byte-identical to what was submitted.
    pub ciphertext: String,
    /// Base64 nonce, byte-identical to what was submitted.
    pub nonce: String,
    /// Unix seconds of acceptance.
    pub created_at: u64,
}

impl From<MessageRecord> for MessageBody {
    fn from(message: MessageRecord) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            ciphertext: BASE64.encode(&message.ciphertext),
            nonce: BASE64.encode(&message.nonce),
            created_at: message.created_at_secs,
        }
    }
}

/// Message submission response body.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    /// The stored message.
    pub message: MessageBody,
}

/// Submit a message to a conversation.
pub async fn send_message<S: DurableStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    auth: AuthIdentity,
    Json(request): Json<MessagePayload>,
) -> ApiResult<(StatusCode, Json<SendMessageResponse>)> {
    let payload = request.decode()?;

    let message =
        state.conversations.send_message(id, auth.identity_id, payload.ciphertext, payload.nonce)?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message: message.into() })))
}

/// Pagination parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessagePage {
    /// Index of the first message to return (oldest-first).
    #[serde(default)]
    pub from: u64,
    /// Page size; clamped to a server-side maximum.
    pub limit: Option<usize>,
}

/// Message listing response body.
#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    /// Messages in `[from, from+limit)`, oldest first.
    pub messages: Vec<MessageBody>,
}

/// List messages in a conversation (participants only).
pub async fn list_messages<S: DurableStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    auth: AuthIdentity,
    Query(page): Query<MessagePage>,
) -> ApiResult<Json<ListMessagesResponse>> {
    let limit = page.limit.unwrap_or(DEFAULT_MESSAGE_PAGE).min(MAX_MESSAGE_PAGE);

    let messages = state.conversations.messages(id, auth.identity_id, page.from, limit)?;

    Ok(Json(ListMessagesResponse {
        messages: messages.into_iter().map(MessageBody::from).collect(),
    }))
}
