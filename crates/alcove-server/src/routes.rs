//! Route table.

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState, storage::DurableStore};

/// Build the full application router over a storage backend.
pub fn router<S: DurableStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/challenge", post(handlers::auth::challenge))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/messages/conversations", post(handlers::messages::create_conversation))
        .route("/messages/conversations/{id}", get(handlers::messages::conversation_detail))
        .route(
            "/messages/conversations/{id}/messages",
            post(handlers::messages::send_message).get(handlers::messages::list_messages),
        )
        .with_state(state)
}
