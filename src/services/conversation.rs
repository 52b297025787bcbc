//! Account-owned conversations and messages (the main store).
//!
//! Only the operations the chat path and the transfer engine need: create a
//! conversation on first use, append a turn, and list history. Every access
//! by id checks the owning user.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    NotFound(Uuid),
    #[error("conversation {0} belongs to another owner")]
    Forbidden(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Trim and clamp a client-supplied title.
#[must_use]
pub fn normalize_title(title: Option<&str>) -> String {
    title
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Map a looked-up owner to the ownership rule shared by both stores.
pub(crate) fn check_owner<T: PartialEq>(
    conversation_id: Uuid,
    owner: Option<T>,
    caller: &T,
) -> Result<(), ConversationError> {
    match owner {
        None => Err(ConversationError::NotFound(conversation_id)),
        Some(owner) if owner == *caller => Ok(()),
        Some(_) => Err(ConversationError::Forbidden(conversation_id)),
    }
}

async fn owner_of(pool: &PgPool, conversation_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM conversations WHERE id = $1")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await
}

/// Create the conversation for `user_id` if it does not exist yet.
///
/// # Errors
///
/// [`ConversationError::Forbidden`] if the id is owned by another user.
pub async fn ensure_conversation(
    pool: &PgPool,
    user_id: Uuid,
    conversation_id: Uuid,
    title: &str,
) -> Result<Uuid, ConversationError> {
    sqlx::query(
        r"INSERT INTO conversations (id, user_id, title)
          VALUES ($1, $2, $3)
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(title)
    .execute(pool)
    .await?;

    check_owner(conversation_id, owner_of(pool, conversation_id).await?, &user_id)?;
    Ok(conversation_id)
}

/// Append one message, returning its id.
///
/// # Errors
///
/// [`ConversationError::NotFound`] / [`ConversationError::Forbidden`] when the
/// conversation is missing or owned by someone else.
pub async fn append_message(
    pool: &PgPool,
    user_id: Uuid,
    conversation_id: Uuid,
    role: Role,
    content: &str,
) -> Result<Uuid, ConversationError> {
    check_owner(conversation_id, owner_of(pool, conversation_id).await?, &user_id)?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO messages (id, conversation_id, role, content) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .execute(pool)
        .await?;
    Ok(id)
}

/// List a user's conversations, newest first.
pub async fn list_conversations(pool: &PgPool, user_id: Uuid) -> Result<Vec<ConversationRow>, ConversationError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        "SELECT id, title, created_at FROM conversations WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_messages(
    pool: &PgPool,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Vec<MessageRow>, ConversationError> {
    check_owner(conversation_id, owner_of(pool, conversation_id).await?, &user_id)?;

    let rows = sqlx::query_as::<_, MessageRow>(
        r"SELECT id, conversation_id, role, content, created_at
          FROM messages
          WHERE conversation_id = $1
          ORDER BY created_at, id",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
