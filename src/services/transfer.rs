//! Transfer engine: fold a guest's staged data into a new account.
//!
//! DESIGN
//! ======
//! Runs in one transaction per invocation:
//! 1. Lock the session's staged conversations (`FOR UPDATE`).
//! 2. Re-home each under the user with the same id via
//!    `INSERT ... ON CONFLICT (id) DO NOTHING`. Zero rows means the id already
//!    exists in the main store; the staged copy is left alone and logged.
//! 3. Copy that conversation's messages with `ON CONFLICT DO NOTHING`, then
//!    delete the staged conversation (messages cascade).
//! 4. Merge usage rows inside the retention horizon with one
//!    `DELETE ... RETURNING` feeding an additive upsert, so a guest who was
//!    already limited does not get a fresh quota by signing in.
//!
//! Only rows migrated by this invocation are deleted, so a retry finds
//! nothing left and reports zero.
//!
//! TRADE-OFFS
//! ==========
//! Never blocks login. Any error rolls back the whole transaction, is logged,
//! and the caller receives an all-zero result; the staged rows stay in place
//! for a later retry or for the reaper.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::identity::SessionHash;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counts moved by one invocation. Advisory: for audit logs and UI notices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub conversations: u64,
    pub messages: u64,
    pub rate_limit_rows: u64,
    /// Conversations left staged because their id already exists in the main store.
    pub skipped_conversations: u64,
}

impl TransferResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations == 0 && self.messages == 0 && self.rate_limit_rows == 0
    }
}

const MERGE_RATE_LIMITS_SQL: &str = r"
WITH moved AS (
    DELETE FROM rate_limits
    WHERE session_hash = $1 AND bucket_end > $3
    RETURNING resource_type, count, bucket_start, bucket_end
)
INSERT INTO rate_limits (user_id, resource_type, count, bucket_start, bucket_end)
SELECT $2, resource_type, count, bucket_start, bucket_end FROM moved
ON CONFLICT (user_id, resource_type, bucket_start) WHERE user_id IS NOT NULL
DO UPDATE SET count = rate_limits.count + EXCLUDED.count, updated_at = now()";

/// Migrate everything staged under `session_hash` to `user_id`.
///
/// Safe to call repeatedly; never returns an error.
pub async fn transfer(pool: &PgPool, session_hash: &SessionHash, user_id: Uuid, retention_days: u32) -> TransferResult {
    match try_transfer(pool, session_hash, user_id, retention_days).await {
        Ok(result) => {
            if !result.is_empty() || result.skipped_conversations > 0 {
                tracing::info!(
                    session = %session_hash,
                    %user_id,
                    conversations = result.conversations,
                    messages = result.messages,
                    rate_limit_rows = result.rate_limit_rows,
                    skipped = result.skipped_conversations,
                    "guest data transferred"
                );
            }
            result
        }
        Err(e) => {
            tracing::error!(error = %e, session = %session_hash, %user_id, "guest transfer failed; left for reconciliation");
            TransferResult::default()
        }
    }
}

async fn try_transfer(
    pool: &PgPool,
    session_hash: &SessionHash,
    user_id: Uuid,
    retention_days: u32,
) -> Result<TransferResult, TransferError> {
    let mut tx = pool.begin().await?;
    let mut result = TransferResult::default();

    let staged = sqlx::query_as::<_, (Uuid, String, OffsetDateTime)>(
        r"SELECT id, title, created_at
          FROM guest_conversations
          WHERE session_hash = $1
          ORDER BY created_at
          FOR UPDATE",
    )
    .bind(session_hash.as_str())
    .fetch_all(&mut *tx)
    .await?;

    for (conversation_id, title, created_at) in staged {
        match rehome_conversation(&mut tx, session_hash, user_id, conversation_id, &title, created_at).await? {
            Some(messages) => {
                result.conversations += 1;
                result.messages += messages;
            }
            None => {
                tracing::warn!(
                    %conversation_id,
                    session = %session_hash,
                    %user_id,
                    "conversation id already present in main store; skipping"
                );
                result.skipped_conversations += 1;
            }
        }
    }

    let horizon = OffsetDateTime::now_utc() - time::Duration::days(i64::from(retention_days));
    result.rate_limit_rows = sqlx::query(MERGE_RATE_LIMITS_SQL)
        .bind(session_hash.as_str())
        .bind(user_id)
        .bind(horizon)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(result)
}

/// Returns the number of messages copied, or `None` if the id collided.
async fn rehome_conversation(
    tx: &mut Transaction<'_, Postgres>,
    session_hash: &SessionHash,
    user_id: Uuid,
    conversation_id: Uuid,
    title: &str,
    created_at: OffsetDateTime,
) -> Result<Option<u64>, sqlx::Error> {
    let inserted = sqlx::query(
        r"INSERT INTO conversations (id, user_id, title, created_at)
          VALUES ($1, $2, $3, $4)
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(title)
    .bind(created_at)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Ok(None);
    }

    let messages = sqlx::query(
        r"INSERT INTO messages (id, conversation_id, role, content, created_at)
          SELECT id, conversation_id, role, content, created_at
          FROM guest_messages
          WHERE conversation_id = $1 AND session_hash = $2
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(conversation_id)
    .bind(session_hash.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    sqlx::query("DELETE FROM guest_conversations WHERE id = $1 AND session_hash = $2")
        .bind(conversation_id)
        .bind(session_hash.as_str())
        .execute(&mut **tx)
        .await?;

    Ok(Some(messages))
}

#[cfg(test)]
#[path = "transfer_test.rs"]
mod tests;
