//! Storage backends for the server.
//!
//! The core defines one trait per concern; a backend usable by the server
//! must implement the three durable ones (identities, refresh tokens,
//! conversations). Challenges are ephemeral by design and always live in
//! the core's in-memory TTL store.

mod redb;

pub use redb::RedbStorage;

use alcove_core::store::{ConversationStore, IdentityStore, RefreshTokenStore};

/// A backend implementing every durable store trait.
///
/// Blanket-implemented; `MemoryStore` and [`RedbStorage`] both qualify.
pub trait DurableStore: IdentityStore + RefreshTokenStore + ConversationStore {}

impl<T> DurableStore for T where T: IdentityStore + RefreshTokenStore + ConversationStore {}
