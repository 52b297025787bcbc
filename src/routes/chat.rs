//! Chat turn submission: the quota-guarded write path.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::Caller;
use super::conversation_error_to_status;
use crate::identity::Identity;
use crate::services::conversation::{self, ConversationError, Role, normalize_title};
use crate::services::staging;
use crate::state::AppState;

/// Titles derived from the first message are cut shorter than the stored maximum.
const DERIVED_TITLE_CHARS: usize = 60;

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    /// Existing conversation to append to. A new one is created when absent.
    pub conversation_id: Option<Uuid>,
    pub content: String,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

fn derive_title(body: &PostMessageBody, content: &str) -> String {
    let title = normalize_title(body.title.as_deref());
    if title.is_empty() { content.chars().take(DERIVED_TITLE_CHARS).collect() } else { title }
}

/// `POST /api/chat/messages`: count the turn against the caller's quota and,
/// if allowed, persist it to the staging store (guest) or the main store.
pub async fn post_message(State(state): State<AppState>, caller: Caller, Json(body): Json<PostMessageBody>) -> Response {
    let content = body.content.trim();
    if content.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "message content is empty" })))
            .into_response();
    }

    let jar = caller.cookie_jar(state.cookie_secure);
    let decision = state.rate_limiter.check(&caller.identity, &caller.ip).await;
    if !decision.allowed {
        return (jar, decision.rejection()).into_response();
    }

    let conversation_id = body.conversation_id.unwrap_or_else(Uuid::new_v4);
    let title = derive_title(&body, content);
    match persist_turn(&state, &caller.identity, conversation_id, &title, content).await {
        Ok(message_id) => {
            (jar, decision.headers(), Json(PostMessageResponse { conversation_id, message_id })).into_response()
        }
        Err(e) => (jar, decision.headers(), conversation_error_to_status(e)).into_response(),
    }
}

async fn persist_turn(
    state: &AppState,
    identity: &Identity,
    conversation_id: Uuid,
    title: &str,
    content: &str,
) -> Result<Uuid, ConversationError> {
    match identity {
        Identity::Guest { session_hash } => {
            staging::ensure_conversation(&state.pool, session_hash, conversation_id, title).await?;
            staging::append_message(&state.pool, session_hash, conversation_id, Role::User, content).await
        }
        Identity::Authenticated { user_id, .. } => {
            conversation::ensure_conversation(&state.pool, *user_id, conversation_id, title).await?;
            conversation::append_message(&state.pool, *user_id, conversation_id, Role::User, content).await
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
