//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the quota-guarded chat endpoint, read-only usage and history
//! listings, the guest-claim hook called after login, and the externally
//! triggered reaper under a single Axum router.

pub mod auth;
pub mod chat;
pub mod cron;
pub mod history;
pub mod usage;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::conversation::ConversationError;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat/messages", post(chat::post_message))
        .route("/api/usage", get(usage::usage))
        .route("/api/guest/conversations", get(history::list_guest_conversations))
        .route("/api/guest/conversations/{id}/messages", get(history::list_guest_messages))
        .route("/api/conversations", get(history::list_conversations))
        .route("/api/conversations/{id}/messages", get(history::list_messages))
        .route("/api/auth/claim-guest", post(auth::claim_guest))
        .route("/api/cron/reap", post(cron::reap))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn conversation_error_to_status(err: ConversationError) -> StatusCode {
    match err {
        ConversationError::NotFound(_) => StatusCode::NOT_FOUND,
        ConversationError::Forbidden(id) => {
            tracing::warn!(conversation_id = %id, "conversation ownership violation");
            StatusCode::FORBIDDEN
        }
        ConversationError::Database(e) => {
            tracing::error!(error = %e, "conversation store error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
