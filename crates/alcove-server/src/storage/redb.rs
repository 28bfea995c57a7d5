//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. All
//! state survives server restarts. Every trait method that the core relies
//! on for atomicity (rotate, bulk revocation, conversation insertion) runs
//! inside a single write transaction, so concurrent callers observe either
//! the whole mutation or none of it.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use alcove_core::{
    Identity, RefreshTokenRecord,
    store::{ConversationStore, IdentityStore, RefreshTokenStore, StoreError},
};
use alcove_core::{Conversation, MessageRecord, ParticipantEnvelope};
use alcove_crypto::{Fingerprint, TokenHash};

/// Table: identities
/// Key: identity id (16 bytes)
/// Value: CBOR-encoded Identity
const IDENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("identities");

/// Table: fingerprint uniqueness index
/// Key: fingerprint (32 bytes)
/// Value: identity id (16 bytes)
const FINGERPRINTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("fingerprints");

/// Table: refresh tokens
/// Key: token row id (16 bytes)
/// Value: CBOR-encoded RefreshTokenRecord
const TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tokens");

/// Table: token hash lookup index
/// Key: SHA-256 of token plaintext (32 bytes)
/// Value: token row id (16 bytes)
const TOKEN_HASHES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("token_hashes");

/// Table: family membership index
/// Key: family id (16 bytes) || token row id (16 bytes)
/// Value: empty
const FAMILY_TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("family_tokens");

/// Table: identity ownership index
/// Key: identity id (16 bytes) || token row id (16 bytes)
/// Value: empty
const IDENTITY_TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("identity_tokens");

/// Table: revocation markers
/// Key: family id (16 bytes)
/// Value: empty
///
/// Markers outlive token rows, so a revoked family stays revoked even
/// after its expired rows are garbage-collected.
const REVOKED_FAMILIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("revoked_families");

/// Table: conversations
/// Key: conversation id (16 bytes)
/// Value: CBOR-encoded Conversation
const CONVERSATIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("conversations");

/// Table: key envelopes
/// Key: conversation id (16 bytes) || identity id (16 bytes)
/// Value: CBOR-encoded ParticipantEnvelope
const ENVELOPES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("envelopes");

/// Table: messages
/// Key: conversation id (16 bytes) || index (8 bytes BE)
/// Value: CBOR-encoded MessageRecord
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates every table up front so later read transactions never see
    /// a missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(IDENTITIES).map_err(io_err)?;
            let _ = txn.open_table(FINGERPRINTS).map_err(io_err)?;
            let _ = txn.open_table(TOKENS).map_err(io_err)?;
            let _ = txn.open_table(TOKEN_HASHES).map_err(io_err)?;
            let _ = txn.open_table(FAMILY_TOKENS).map_err(io_err)?;
            let _ = txn.open_table(IDENTITY_TOKENS).map_err(io_err)?;
            let _ = txn.open_table(REVOKED_FAMILIES).map_err(io_err)?;
            let _ = txn.open_table(CONVERSATIONS).map_err(io_err)?;
            let _ = txn.open_table(ENVELOPES).map_err(io_err)?;
            let _ = txn.open_table(MESSAGES).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn io_err(err: impl Display) -> StoreError {
    StoreError::Io(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Composite key: two UUIDs side by side.
fn pair_key(a: Uuid, b: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(a.as_bytes());
    key[16..].copy_from_slice(b.as_bytes());
    key
}

/// Composite key: conversation id plus a big-endian message index, so a
/// range scan yields messages in order.
fn message_key(conversation_id: Uuid, index: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(conversation_id.as_bytes());
    key[16..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Inclusive range covering every composite key with the given 16-byte
/// prefix.
fn prefix_bounds(prefix: Uuid, suffix_len: usize) -> (Vec<u8>, Vec<u8>) {
    let mut start = prefix.as_bytes().to_vec();
    let mut end = start.clone();
    start.extend(std::iter::repeat_n(0x00, suffix_len));
    end.extend(std::iter::repeat_n(0xFF, suffix_len));
    (start, end)
}

impl IdentityStore for RedbStorage {
    fn insert(&self, identity: &Identity) -> Result<bool, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut fingerprints = txn.open_table(FINGERPRINTS).map_err(io_err)?;

            // Uniqueness check and insert share the transaction, which is
            // what makes concurrent duplicate registrations impossible
            if fingerprints
                .get(identity.fingerprint.as_bytes().as_slice())
                .map_err(io_err)?
                .is_some()
            {
                return Ok(false);
            }

            fingerprints
                .insert(
                    identity.fingerprint.as_bytes().as_slice(),
                    identity.id.as_bytes().as_slice(),
                )
                .map_err(io_err)?;

            let mut identities = txn.open_table(IDENTITIES).map_err(io_err)?;
            identities
                .insert(identity.id.as_bytes().as_slice(), encode(identity)?.as_slice())
                .map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;
        Ok(true)
    }

    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Identity>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let fingerprints = txn.open_table(FINGERPRINTS).map_err(io_err)?;

        let Some(id_guard) =
            fingerprints.get(fingerprint.as_bytes().as_slice()).map_err(io_err)?
        else {
            return Ok(None);
        };
        let id = id_guard.value().to_vec();

        let identities = txn.open_table(IDENTITIES).map_err(io_err)?;
        match identities.get(id.as_slice()).map_err(io_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let identities = txn.open_table(IDENTITIES).map_err(io_err)?;

        match identities.get(id.as_bytes().as_slice()).map_err(io_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn update(&self, identity: &Identity) -> Result<bool, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let updated = {
            let mut identities = txn.open_table(IDENTITIES).map_err(io_err)?;

            if identities.get(identity.id.as_bytes().as_slice()).map_err(io_err)?.is_none() {
                false
            } else {
                identities
                    .insert(identity.id.as_bytes().as_slice(), encode(identity)?.as_slice())
                    .map_err(io_err)?;
                true
            }
        };
        txn.commit().map_err(io_err)?;
        Ok(updated)
    }
}

impl RefreshTokenStore for RedbStorage {
    fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            insert_token_row(&txn, record)?;
        }
        txn.commit().map_err(io_err)
    }

    fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let hashes = txn.open_table(TOKEN_HASHES).map_err(io_err)?;

        let Some(id_guard) = hashes.get(hash.as_bytes().as_slice()).map_err(io_err)? else {
            return Ok(None);
        };
        let id = id_guard.value().to_vec();

        let tokens = txn.open_table(TOKENS).map_err(io_err)?;
        match tokens.get(id.as_slice()).map_err(io_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn rotate(&self, parent_id: Uuid, child: &RefreshTokenRecord) -> Result<bool, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let rotated = {
            let mut tokens = txn.open_table(TOKENS).map_err(io_err)?;

            // CAS inside the transaction: read the parent's current state
            // and only proceed from Active
            let parent: Option<RefreshTokenRecord> =
                match tokens.get(parent_id.as_bytes().as_slice()).map_err(io_err)? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };

            match parent {
                Some(mut record) => match record.state.consume() {
                    Some(consumed) => {
                        record.state = consumed;
                        tokens
                            .insert(
                                parent_id.as_bytes().as_slice(),
                                encode(&record)?.as_slice(),
                            )
                            .map_err(io_err)?;
                        drop(tokens);
                        insert_token_row(&txn, child)?;
                        true
                    },
                    None => false,
                },
                None => false,
            }
        };

        if rotated {
            txn.commit().map_err(io_err)?;
        } else {
            txn.abort().map_err(io_err)?;
        }
        Ok(rotated)
    }

    fn revoke_family(&self, family_id: Uuid) -> Result<usize, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let revoked = {
            let members = {
                let index = txn.open_table(FAMILY_TOKENS).map_err(io_err)?;
                collect_index_suffixes(&index, family_id)?
            };

            let mut tokens = txn.open_table(TOKENS).map_err(io_err)?;
            let revoked = revoke_rows(&mut tokens, &members)?;

            let mut markers = txn.open_table(REVOKED_FAMILIES).map_err(io_err)?;
            markers
                .insert(family_id.as_bytes().as_slice(), b"".as_slice())
                .map_err(io_err)?;

            revoked
        };
        txn.commit().map_err(io_err)?;
        Ok(revoked)
    }

    fn revoke_all(&self, identity_id: Uuid) -> Result<usize, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let revoked = {
            let members = {
                let index = txn.open_table(IDENTITY_TOKENS).map_err(io_err)?;
                collect_index_suffixes(&index, identity_id)?
            };

            let mut tokens = txn.open_table(TOKENS).map_err(io_err)?;
            let mut families = Vec::new();
            for id in &members {
                if let Some(guard) = tokens.get(id.as_bytes().as_slice()).map_err(io_err)? {
                    let record: RefreshTokenRecord = decode(guard.value())?;
                    if !families.contains(&record.family_id) {
                        families.push(record.family_id);
                    }
                }
            }
            let revoked = revoke_rows(&mut tokens, &members)?;

            // Every touched family gets a marker so strict access-token
            // validation sees the revocation too
            let mut markers = txn.open_table(REVOKED_FAMILIES).map_err(io_err)?;
            for family in families {
                markers.insert(family.as_bytes().as_slice(), b"".as_slice()).map_err(io_err)?;
            }

            revoked
        };
        txn.commit().map_err(io_err)?;
        Ok(revoked)
    }

    fn family_revoked(&self, family_id: Uuid) -> Result<bool, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let markers = txn.open_table(REVOKED_FAMILIES).map_err(io_err)?;
        Ok(markers.get(family_id.as_bytes().as_slice()).map_err(io_err)?.is_some())
    }

    fn evict_expired(&self, now_secs: u64) -> Result<usize, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let evicted = {
            let mut tokens = txn.open_table(TOKENS).map_err(io_err)?;

            let mut expired = Vec::new();
            for entry in tokens.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                let record: RefreshTokenRecord = decode(value.value())?;
                if record.is_expired(now_secs) {
                    expired.push(record);
                }
            }

            for record in &expired {
                tokens.remove(record.id.as_bytes().as_slice()).map_err(io_err)?;
            }
            drop(tokens);

            let mut hashes = txn.open_table(TOKEN_HASHES).map_err(io_err)?;
            let mut family_index = txn.open_table(FAMILY_TOKENS).map_err(io_err)?;
            let mut identity_index = txn.open_table(IDENTITY_TOKENS).map_err(io_err)?;
            for record in &expired {
                hashes.remove(record.token_hash.as_bytes().as_slice()).map_err(io_err)?;
                family_index
                    .remove(pair_key(record.family_id, record.id).as_slice())
                    .map_err(io_err)?;
                identity_index
                    .remove(pair_key(record.identity_id, record.id).as_slice())
                    .map_err(io_err)?;
            }

            expired.len()
        };
        txn.commit().map_err(io_err)?;
        Ok(evicted)
    }
}

/// Insert a token row and its three index entries.
fn insert_token_row(
    txn: &redb::WriteTransaction,
    record: &RefreshTokenRecord,
) -> Result<(), StoreError> {
    let mut tokens = txn.open_table(TOKENS).map_err(io_err)?;
    tokens
        .insert(record.id.as_bytes().as_slice(), encode(record)?.as_slice())
        .map_err(io_err)?;
    drop(tokens);

    let mut hashes = txn.open_table(TOKEN_HASHES).map_err(io_err)?;
    hashes
        .insert(record.token_hash.as_bytes().as_slice(), record.id.as_bytes().as_slice())
        .map_err(io_err)?;
    drop(hashes);

    let mut family_index = txn.open_table(FAMILY_TOKENS).map_err(io_err)?;
    family_index
        .insert(pair_key(record.family_id, record.id).as_slice(), b"".as_slice())
        .map_err(io_err)?;
    drop(family_index);

    let mut identity_index = txn.open_table(IDENTITY_TOKENS).map_err(io_err)?;
    identity_index
        .insert(pair_key(record.identity_id, record.id).as_slice(), b"".as_slice())
        .map_err(io_err)?;

    Ok(())
}

/// Collect the suffix UUIDs of every index key with the given prefix.
fn collect_index_suffixes<T: ReadableTable<&'static [u8], &'static [u8]>>(
    index: &T,
    prefix: Uuid,
) -> Result<Vec<Uuid>, StoreError> {
    let (start, end) = prefix_bounds(prefix, 16);

    let mut ids = Vec::new();
    for entry in index.range(start.as_slice()..=end.as_slice()).map_err(io_err)? {
        let (key, _) = entry.map_err(io_err)?;
        let bytes: [u8; 16] = key.value()[16..32]
            .try_into()
            .map_err(|_| StoreError::Serialization("bad index key".to_string()))?;
        ids.push(Uuid::from_bytes(bytes));
    }
    Ok(ids)
}

/// Set every listed row to `Revoked`, counting actual state changes.
fn revoke_rows(
    tokens: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
    ids: &[Uuid],
) -> Result<usize, StoreError> {
    let mut revoked = 0;
    for id in ids {
        let record: Option<RefreshTokenRecord> =
            match tokens.get(id.as_bytes().as_slice()).map_err(io_err)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };

        if let Some(mut record) = record {
            if !record.state.is_revoked() {
                record.state = record.state.revoke();
                tokens
                    .insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())
                    .map_err(io_err)?;
                revoked += 1;
            }
        }
    }
    Ok(revoked)
}

impl ConversationStore for RedbStorage {
    fn insert_conversation(
        &self,
        conversation: &Conversation,
        envelopes: &[ParticipantEnvelope],
        first_message: Option<&MessageRecord>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut conversations = txn.open_table(CONVERSATIONS).map_err(io_err)?;
            conversations
                .insert(conversation.id.as_bytes().as_slice(), encode(conversation)?.as_slice())
                .map_err(io_err)?;
            drop(conversations);

            let mut envelope_table = txn.open_table(ENVELOPES).map_err(io_err)?;
            for envelope in envelopes {
                envelope_table
                    .insert(
                        pair_key(conversation.id, envelope.identity_id).as_slice(),
                        encode(envelope)?.as_slice(),
                    )
                    .map_err(io_err)?;
            }
            drop(envelope_table);

            if let Some(message) = first_message {
                let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;
                messages
                    .insert(
                        message_key(conversation.id, 0).as_slice(),
                        encode(message)?.as_slice(),
                    )
                    .map_err(io_err)?;
            }
        }
        txn.commit().map_err(io_err)
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let conversations = txn.open_table(CONVERSATIONS).map_err(io_err)?;

        match conversations.get(id.as_bytes().as_slice()).map_err(io_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn envelopes(&self, conversation_id: Uuid) -> Result<Vec<ParticipantEnvelope>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let envelope_table = txn.open_table(ENVELOPES).map_err(io_err)?;

        let (start, end) = prefix_bounds(conversation_id, 16);
        let mut envelopes = Vec::new();
        for entry in envelope_table.range(start.as_slice()..=end.as_slice()).map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            envelopes.push(decode(value.value())?);
        }
        Ok(envelopes)
    }

    fn is_participant(
        &self,
        conversation_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<bool>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;

        let conversations = txn.open_table(CONVERSATIONS).map_err(io_err)?;
        if conversations.get(conversation_id.as_bytes().as_slice()).map_err(io_err)?.is_none() {
            return Ok(None);
        }

        let envelope_table = txn.open_table(ENVELOPES).map_err(io_err)?;
        Ok(Some(
            envelope_table
                .get(pair_key(conversation_id, identity_id).as_slice())
                .map_err(io_err)?
                .is_some(),
        ))
    }

    fn insert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;

            // Next index = last key in the conversation's range + 1; the
            // write transaction serializes appenders
            let (start, end) = prefix_bounds(message.conversation_id, 8);
            let next_index = match messages
                .range(start.as_slice()..=end.as_slice())
                .map_err(io_err)?
                .next_back()
            {
                Some(entry) => {
                    let (key, _) = entry.map_err(io_err)?;
                    let bytes: [u8; 8] = key.value()[16..24]
                        .try_into()
                        .map_err(|_| StoreError::Serialization("bad message key".to_string()))?;
                    u64::from_be_bytes(bytes) + 1
                },
                None => 0,
            };

            messages
                .insert(
                    message_key(message.conversation_id, next_index).as_slice(),
                    encode(message)?.as_slice(),
                )
                .map_err(io_err)?;
        }
        txn.commit().map_err(io_err)
    }

    fn messages(
        &self,
        conversation_id: Uuid,
        from: u64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let message_table = txn.open_table(MESSAGES).map_err(io_err)?;

        let start = message_key(conversation_id, from);
        let (_, end) = prefix_bounds(conversation_id, 8);

        let mut messages = Vec::new();
        for entry in message_table
            .range(start.as_slice()..=end.as_slice())
            .map_err(io_err)?
            .take(limit)
        {
            let (_, value) = entry.map_err(io_err)?;
            messages.push(decode(value.value())?);
        }
        Ok(messages)
    }
}
