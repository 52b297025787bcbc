//! Guest staging store.
//!
//! DESIGN
//! ======
//! Guest conversations and messages mirror the account-owned shape but live
//! in `guest_conversations` / `guest_messages`, keyed by session hash. Every
//! function here takes the caller's [`SessionHash`] as derived server-side;
//! nothing accepts a client-chosen owner. Messages carry the session hash in
//! a composite foreign key, so a message can never hang off another session's
//! conversation even if an ownership check were skipped.

use sqlx::PgPool;
use uuid::Uuid;

use crate::identity::SessionHash;
use crate::services::conversation::{ConversationError, ConversationRow, MessageRow, Role, check_owner};

async fn owner_of(pool: &PgPool, conversation_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT session_hash FROM guest_conversations WHERE id = $1")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await
}

async fn ensure_owner(pool: &PgPool, session_hash: &SessionHash, conversation_id: Uuid) -> Result<(), ConversationError> {
    let owner = owner_of(pool, conversation_id).await?;
    check_owner(conversation_id, owner.as_deref(), &session_hash.as_str())
}

/// Create a staged conversation for this session if it does not exist yet.
///
/// # Errors
///
/// [`ConversationError::Forbidden`] if the id belongs to another session.
pub async fn ensure_conversation(
    pool: &PgPool,
    session_hash: &SessionHash,
    conversation_id: Uuid,
    title: &str,
) -> Result<Uuid, ConversationError> {
    sqlx::query(
        r"INSERT INTO guest_conversations (id, session_hash, title)
          VALUES ($1, $2, $3)
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(conversation_id)
    .bind(session_hash.as_str())
    .bind(title)
    .execute(pool)
    .await?;

    ensure_owner(pool, session_hash, conversation_id).await?;
    Ok(conversation_id)
}

/// Append a staged message, returning its id.
///
/// # Errors
///
/// [`ConversationError::NotFound`] / [`ConversationError::Forbidden`] when the
/// conversation is missing or owned by another session.
pub async fn append_message(
    pool: &PgPool,
    session_hash: &SessionHash,
    conversation_id: Uuid,
    role: Role,
    content: &str,
) -> Result<Uuid, ConversationError> {
    ensure_owner(pool, session_hash, conversation_id).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        r"INSERT INTO guest_messages (id, conversation_id, session_hash, role, content)
          VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(conversation_id)
    .bind(session_hash.as_str())
    .bind(role.as_str())
    .bind(content)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn list_conversations(
    pool: &PgPool,
    session_hash: &SessionHash,
) -> Result<Vec<ConversationRow>, ConversationError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        "SELECT id, title, created_at FROM guest_conversations WHERE session_hash = $1 ORDER BY created_at DESC",
    )
    .bind(session_hash.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_messages(
    pool: &PgPool,
    session_hash: &SessionHash,
    conversation_id: Uuid,
) -> Result<Vec<MessageRow>, ConversationError> {
    ensure_owner(pool, session_hash, conversation_id).await?;

    let rows = sqlx::query_as::<_, MessageRow>(
        r"SELECT id, conversation_id, role, content, created_at
          FROM guest_messages
          WHERE conversation_id = $1 AND session_hash = $2
          ORDER BY created_at, id",
    )
    .bind(conversation_id)
    .bind(session_hash.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "staging_test.rs"]
mod tests;
