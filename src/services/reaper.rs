//! Reaper: daily sweep of expired guest staging data.
//!
//! Triggered externally (see `POST /api/cron/reap`). Deletes guest
//! conversations created before the retention horizon, letting the foreign
//! key cascade remove their messages, and guest-keyed usage rows whose bucket
//! ended before the horizon. Account-keyed usage rows are kept for analytics.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Staged conversations removed. Cascaded messages are not counted.
    pub conversations_deleted: u64,
    pub rate_limit_rows_deleted: u64,
}

#[must_use]
pub fn horizon(now: OffsetDateTime, retention_days: u32) -> OffsetDateTime {
    now - time::Duration::days(i64::from(retention_days))
}

/// Delete guest staging rows older than `retention_days`.
///
/// # Errors
///
/// Returns an error if either delete fails. The first delete is not rolled
/// back if the second fails; the next sweep picks up the remainder.
pub async fn sweep(pool: &PgPool, retention_days: u32) -> Result<SweepReport, ReaperError> {
    sweep_at(pool, retention_days, OffsetDateTime::now_utc()).await
}

pub(crate) async fn sweep_at(
    pool: &PgPool,
    retention_days: u32,
    now: OffsetDateTime,
) -> Result<SweepReport, ReaperError> {
    let cutoff = horizon(now, retention_days);

    let conversations_deleted = sqlx::query("DELETE FROM guest_conversations WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let rate_limit_rows_deleted =
        sqlx::query("DELETE FROM rate_limits WHERE session_hash IS NOT NULL AND bucket_end < $1")
            .bind(cutoff)
            .execute(pool)
            .await?
            .rows_affected();

    let report = SweepReport { conversations_deleted, rate_limit_rows_deleted };
    tracing::info!(
        retention_days,
        conversations = report.conversations_deleted,
        rate_limit_rows = report.rate_limit_rows_deleted,
        "guest staging sweep complete"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "reaper_test.rs"]
mod tests;
