//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the Postgres pool, the guest identity resolver, and the quota
//! orchestrator (which owns the fast-gate store handle). Everything is
//! cheap to clone.

use sqlx::PgPool;

use crate::identity::IdentityResolver;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub resolver: IdentityResolver,
    pub rate_limiter: RateLimiter,
    pub cookie_secure: bool,
    pub guest_retention_days: u32,
    /// Bearer token for `POST /api/cron/reap`. `None` disables the endpoint.
    pub cron_secret: Option<String>,
}

// =============================================================================
// TEST HELPERS
// =============================================================================
