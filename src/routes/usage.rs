//! Read-only quota status.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::auth::Caller;
use crate::rate_limit::{Quota, RateLimitDecision};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// `None` serializes as `null` for unlimited plans.
    pub limit: Option<u32>,
    pub used: u32,
    pub remaining: Option<u32>,
    pub reset_at_ms: i64,
    pub degraded: bool,
}

impl From<&RateLimitDecision> for UsageResponse {
    fn from(decision: &RateLimitDecision) -> Self {
        let limit = match decision.quota {
            Quota::Limited(n) => Some(n),
            Quota::Unlimited => None,
        };
        Self {
            limit,
            used: decision.used,
            remaining: decision.remaining(),
            reset_at_ms: decision.reset_at_ms,
            degraded: decision.degraded,
        }
    }
}

/// `GET /api/usage`: caller's usage in the current day bucket. Does not
/// count as a request.
pub async fn usage(State(state): State<AppState>, caller: Caller) -> Response {
    let decision = state.rate_limiter.usage(&caller.identity).await;
    (
        caller.cookie_jar(state.cookie_secure),
        decision.headers(),
        Json(UsageResponse::from(&decision)),
    )
        .into_response()
}
