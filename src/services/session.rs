//! Account session lookup.
//!
//! ARCHITECTURE
//! ============
//! Stand-in for the authentication collaborator: login flows (out of scope
//! here) insert a row into `sessions` and set the `session_token` cookie.
//! This module only turns that token into `(user_id, plan)` for the quota
//! path; session creation exists for tests.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::identity::Plan;

/// Generate a cryptographically random 32-byte hex token.
#[cfg(test)]
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// User row returned from session validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub plan: Plan,
}

/// Create a session for the given user, returning the token.
#[cfg(test)]
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query("INSERT INTO sessions (token, user_id) VALUES ($1, $2)")
        .bind(&token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.name, u.plan
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        id: r.get("id"),
        name: r.get("name"),
        plan: Plan::from_db(r.get::<&str, _>("plan")),
    }))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
