//! Accurate counter: per-identity, day-bucketed usage in Postgres.
//!
//! DESIGN
//! ======
//! One row per `(identity, resource_type, bucket_start)`. Buckets are aligned
//! to UTC midnight, so lookups are a unique-index probe and cleanup is a
//! range delete on `bucket_end`.
//!
//! The increment is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE
//! count < limit` statement. Postgres locks the conflicting row and re-checks
//! the `WHERE` against the latest version, so concurrent increments for the
//! same bucket serialize: with a limit of 10 exactly ten callers get a row
//! back and the rest see the limit. A rejected call writes nothing, so
//! repeated rejections never inflate the stored count.
//!
//! TRADE-OFFS
//! ==========
//! Store failures fail open with a zeroed count. This is the only layer that
//! enforces quota for authenticated users, so every fail-open is logged at
//! error severity for alerting.

use std::time::Duration;

use sqlx::PgPool;
use time::{OffsetDateTime, Time, UtcOffset};

use crate::identity::IdentityKey;

pub const RESOURCE_MESSAGE: &str = "message";
pub const DEFAULT_WINDOW_HOURS: u32 = 24;
/// Limit handed in for paid accounts: usage is tracked, never rejected.
pub const UNLIMITED_SENTINEL: u32 = 999_999;

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// BUCKETS
// =============================================================================

/// Half-open `[start, end)` counting interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Bucket {
    /// Bucket containing `now`: UTC midnight plus `window_hours`.
    #[must_use]
    pub fn containing(now: OffsetDateTime, window_hours: u32) -> Self {
        let start = now.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT);
        let end = start + time::Duration::hours(i64::from(window_hours.max(1)));
        Self { start, end }
    }

    #[must_use]
    pub fn end_epoch_ms(&self) -> i64 {
        i64::try_from(self.end.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOutcome {
    /// Stored count after this call.
    pub count: u32,
    /// This call was rejected because the bucket was already at its limit.
    pub limit_reached: bool,
    pub bucket: Bucket,
    /// Store was unreachable and the counter failed open.
    pub degraded: bool,
}

impl CounterOutcome {
    fn fail_open(bucket: Bucket) -> Self {
        Self { count: 0, limit_reached: false, bucket, degraded: true }
    }
}

// =============================================================================
// COUNTER
// =============================================================================

#[derive(Clone)]
pub struct AccurateCounter {
    pool: PgPool,
    timeout: Duration,
}

impl AccurateCounter {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Atomically increment the caller's bucket unless it is already at
    /// `limit`. Never fails: store errors yield a degraded, allowed outcome.
    pub async fn increment_and_check(
        &self,
        key: &IdentityKey,
        resource_type: &str,
        limit: u32,
        window_hours: u32,
    ) -> CounterOutcome {
        self.increment_and_check_at(key, resource_type, limit, window_hours, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn increment_and_check_at(
        &self,
        key: &IdentityKey,
        resource_type: &str,
        limit: u32,
        window_hours: u32,
        now: OffsetDateTime,
    ) -> CounterOutcome {
        let bucket = Bucket::containing(now, window_hours);
        let attempt = tokio::time::timeout(self.timeout, try_increment(&self.pool, key, resource_type, limit, bucket))
            .await
            .unwrap_or(Err(CounterError::Timeout(self.timeout)));

        match attempt {
            Ok((count, limit_reached)) => CounterOutcome { count, limit_reached, bucket, degraded: false },
            Err(e) => {
                tracing::error!(error = %e, identity = %key, resource_type, "accurate counter unavailable; failing open");
                CounterOutcome::fail_open(bucket)
            }
        }
    }

    /// Read-only view of the current bucket. `limit_reached` reports whether
    /// the next increment would be rejected.
    pub async fn status(&self, key: &IdentityKey, resource_type: &str, limit: u32) -> CounterOutcome {
        let bucket = Bucket::containing(OffsetDateTime::now_utc(), DEFAULT_WINDOW_HOURS);
        let attempt = tokio::time::timeout(self.timeout, current_count(&self.pool, key, resource_type, bucket))
            .await
            .unwrap_or(Err(CounterError::Timeout(self.timeout)));

        match attempt {
            Ok(count) => CounterOutcome { count, limit_reached: count >= limit, bucket, degraded: false },
            Err(e) => {
                tracing::error!(error = %e, identity = %key, resource_type, "usage lookup failed");
                CounterOutcome::fail_open(bucket)
            }
        }
    }
}

const INCREMENT_USER_SQL: &str = r"
WITH bumped AS (
    INSERT INTO rate_limits (user_id, resource_type, count, bucket_start, bucket_end)
    VALUES ($1, $2, 1, $3, $4)
    ON CONFLICT (user_id, resource_type, bucket_start) WHERE user_id IS NOT NULL
    DO UPDATE SET count = rate_limits.count + 1, updated_at = now()
    WHERE rate_limits.count < $5
    RETURNING count
)
SELECT count FROM bumped";

const INCREMENT_SESSION_SQL: &str = r"
WITH bumped AS (
    INSERT INTO rate_limits (session_hash, resource_type, count, bucket_start, bucket_end)
    VALUES ($1, $2, 1, $3, $4)
    ON CONFLICT (session_hash, resource_type, bucket_start) WHERE session_hash IS NOT NULL
    DO UPDATE SET count = rate_limits.count + 1, updated_at = now()
    WHERE rate_limits.count < $5
    RETURNING count
)
SELECT count FROM bumped";

const COUNT_USER_SQL: &str =
    "SELECT count FROM rate_limits WHERE user_id = $1 AND resource_type = $2 AND bucket_start = $3";
const COUNT_SESSION_SQL: &str =
    "SELECT count FROM rate_limits WHERE session_hash = $1 AND resource_type = $2 AND bucket_start = $3";

/// Returns `(count, limit_reached)`.
async fn try_increment(
    pool: &PgPool,
    key: &IdentityKey,
    resource_type: &str,
    limit: u32,
    bucket: Bucket,
) -> Result<(u32, bool), CounterError> {
    // A zero limit must not create a row with count 1.
    if limit == 0 {
        let count = current_count(pool, key, resource_type, bucket).await?;
        return Ok((count, true));
    }

    let sql = match key {
        IdentityKey::User(_) => INCREMENT_USER_SQL,
        IdentityKey::Session(_) => INCREMENT_SESSION_SQL,
    };
    let query = sqlx::query_scalar::<_, i32>(sql);
    let query = match key {
        IdentityKey::User(id) => query.bind(*id),
        IdentityKey::Session(hash) => query.bind(hash.as_str()),
    };
    let bumped = query
        .bind(resource_type)
        .bind(bucket.start)
        .bind(bucket.end)
        .bind(i32::try_from(limit).unwrap_or(i32::MAX))
        .fetch_optional(pool)
        .await?;

    match bumped {
        Some(count) => Ok((to_count(count), false)),
        None => {
            // Rejected: the row exists and is at its limit. Report what is stored.
            let count = current_count(pool, key, resource_type, bucket).await?;
            Ok((count.max(limit), true))
        }
    }
}

async fn current_count(
    pool: &PgPool,
    key: &IdentityKey,
    resource_type: &str,
    bucket: Bucket,
) -> Result<u32, CounterError> {
    let sql = match key {
        IdentityKey::User(_) => COUNT_USER_SQL,
        IdentityKey::Session(_) => COUNT_SESSION_SQL,
    };
    let query = sqlx::query_scalar::<_, i32>(sql);
    let query = match key {
        IdentityKey::User(id) => query.bind(*id),
        IdentityKey::Session(hash) => query.bind(hash.as_str()),
    };
    let count = query
        .bind(resource_type)
        .bind(bucket.start)
        .fetch_optional(pool)
        .await?;
    Ok(count.map_or(0, to_count))
}

fn to_count(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

#[cfg(test)]
#[path = "counter_test.rs"]
mod tests;
