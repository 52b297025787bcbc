//! Conversation history listings for guests (staging store) and account
//! holders (main store).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use super::auth::{AuthUser, Caller};
use super::conversation_error_to_status;
use crate::identity::Identity;
use crate::services::conversation::{self, ConversationRow, MessageRow};
use crate::services::staging;
use crate::state::AppState;

/// `GET /api/guest/conversations`: staged conversations for the guest cookie.
///
/// Account holders have nothing staged and get an empty list. A caller
/// without a guest cookie is minted a token they never receive, so the
/// lookup comes back empty as well.
pub async fn list_guest_conversations(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ConversationRow>>, StatusCode> {
    let Identity::Guest { session_hash } = &caller.identity else {
        return Ok(Json(Vec::new()));
    };
    let rows = staging::list_conversations(&state.pool, session_hash)
        .await
        .map_err(conversation_error_to_status)?;
    Ok(Json(rows))
}

/// `GET /api/guest/conversations/{id}/messages`
pub async fn list_guest_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageRow>>, StatusCode> {
    let Identity::Guest { session_hash } = &caller.identity else {
        return Err(StatusCode::NOT_FOUND);
    };
    let rows = staging::list_messages(&state.pool, session_hash, conversation_id)
        .await
        .map_err(conversation_error_to_status)?;
    Ok(Json(rows))
}

/// `GET /api/conversations`
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationRow>>, StatusCode> {
    let rows = conversation::list_conversations(&state.pool, auth.user.id)
        .await
        .map_err(conversation_error_to_status)?;
    Ok(Json(rows))
}

/// `GET /api/conversations/{id}/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageRow>>, StatusCode> {
    let rows = conversation::list_messages(&state.pool, auth.user.id, conversation_id)
        .await
        .map_err(conversation_error_to_status)?;
    Ok(Json(rows))
}
