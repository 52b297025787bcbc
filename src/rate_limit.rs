//! Per-request quota decision.
//!
//! DESIGN
//! ======
//! Composes the fast gate and the accurate counter:
//! - Guest: fast gate by client IP, then the counter keyed by session hash
//!   with the guest daily limit.
//! - Authenticated: counter only, keyed by user id, with the free daily limit
//!   or the unlimited sentinel for paid plans.
//!
//! Allowed and denied decisions both carry the `X-RateLimit-*` header set.
//! The two stores fail open independently; if either did, the decision is
//! marked degraded and `X-RateLimit-Degraded: true` is emitted.

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::config::QuotaConfig;
use crate::fast_gate::{ClientIp, FastGate, GateCheck};
use crate::identity::{Identity, Plan};
use crate::services::counter::{AccurateCounter, CounterOutcome, DEFAULT_WINDOW_HOURS, RESOURCE_MESSAGE, UNLIMITED_SENTINEL};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_LAYER: &str = "x-ratelimit-layer";
pub const HEADER_DEGRADED: &str = "x-ratelimit-degraded";

// =============================================================================
// DECISION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Fast,
    Accurate,
}

impl Layer {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    /// Limit handed to the counter. Unlimited still counts, against a
    /// sentinel no one reaches.
    #[must_use]
    pub fn counter_limit(self) -> u32 {
        match self {
            Self::Limited(n) => n,
            Self::Unlimited => UNLIMITED_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NetworkLimit,
    GuestDailyLimit,
    FreeDailyLimit,
}

impl DenyReason {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::NetworkLimit => "Too many requests from your network today. Sign in to keep chatting.",
            Self::GuestDailyLimit => "You've reached the daily guest message limit. Sign in to keep chatting.",
            Self::FreeDailyLimit => "You've reached your daily message limit. Upgrade to remove the limit.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub layer: Layer,
    pub quota: Quota,
    /// Requests counted in the current window.
    pub used: u32,
    pub reset_at_ms: i64,
    pub degraded: bool,
    pub reason: Option<DenyReason>,
}

impl RateLimitDecision {
    pub(crate) fn from_gate_denial(check: &GateCheck) -> Self {
        Self {
            allowed: false,
            layer: Layer::Fast,
            quota: Quota::Limited(check.limit),
            used: check.limit.saturating_sub(check.remaining),
            reset_at_ms: check.reset_at_ms,
            degraded: check.degraded,
            reason: Some(DenyReason::NetworkLimit),
        }
    }

    pub(crate) fn from_counter(identity: &Identity, quota: Quota, outcome: &CounterOutcome, gate_degraded: bool) -> Self {
        let reason = outcome.limit_reached.then(|| match identity {
            Identity::Guest { .. } => DenyReason::GuestDailyLimit,
            Identity::Authenticated { .. } => DenyReason::FreeDailyLimit,
        });
        Self {
            allowed: !outcome.limit_reached,
            layer: Layer::Accurate,
            quota,
            used: outcome.count,
            reset_at_ms: outcome.bucket.end_epoch_ms(),
            degraded: gate_degraded || outcome.degraded,
            reason,
        }
    }

    /// Remaining requests, `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        match self.quota {
            Quota::Limited(limit) => Some(limit.saturating_sub(self.used)),
            Quota::Unlimited => None,
        }
    }

    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let unlimited = HeaderValue::from_static("unlimited");
        let mut headers = HeaderMap::new();
        match self.quota {
            Quota::Limited(limit) => {
                headers.insert(HEADER_LIMIT, HeaderValue::from(limit));
            }
            Quota::Unlimited => {
                headers.insert(HEADER_LIMIT, unlimited.clone());
            }
        }
        headers.insert(HEADER_REMAINING, self.remaining().map_or(unlimited, HeaderValue::from));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at_ms));
        headers.insert(HEADER_LAYER, HeaderValue::from_static(self.layer.as_str()));
        if self.degraded {
            headers.insert(HEADER_DEGRADED, HeaderValue::from_static("true"));
        }
        headers
    }

    /// 429 response with the header set and `{ "error": reason }`.
    #[must_use]
    pub fn rejection(&self) -> Response {
        let message = self.reason.map_or("Rate limit exceeded.", DenyReason::message);
        (
            StatusCode::TOO_MANY_REQUESTS,
            self.headers(),
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    gate: FastGate,
    counter: AccurateCounter,
    quotas: QuotaConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(gate: FastGate, counter: AccurateCounter, quotas: QuotaConfig) -> Self {
        Self { gate, counter, quotas }
    }

    #[must_use]
    pub fn quota_for(&self, identity: &Identity) -> Quota {
        match identity {
            Identity::Guest { .. } => Quota::Limited(self.quotas.guest_daily),
            Identity::Authenticated { plan: Plan::Free, .. } => Quota::Limited(self.quotas.free_daily),
            Identity::Authenticated { plan: Plan::Paid, .. } => Quota::Unlimited,
        }
    }

    /// Count one message against the caller's quota.
    pub async fn check(&self, identity: &Identity, ip: &ClientIp) -> RateLimitDecision {
        let mut gate_degraded = false;
        if identity.is_guest() {
            let gate = self.gate.check_ip(ip).await;
            if !gate.allowed {
                return RateLimitDecision::from_gate_denial(&gate);
            }
            gate_degraded = gate.degraded;
        }

        let quota = self.quota_for(identity);
        let outcome = self
            .counter
            .increment_and_check(&identity.key(), RESOURCE_MESSAGE, quota.counter_limit(), DEFAULT_WINDOW_HOURS)
            .await;
        let decision = RateLimitDecision::from_counter(identity, quota, &outcome, gate_degraded);
        if !decision.allowed {
            tracing::info!(identity = %identity.key(), used = decision.used, "daily quota reached");
        }
        decision
    }

    /// Current usage without counting a request. `allowed` reports whether
    /// the next message would pass the accurate counter.
    pub async fn usage(&self, identity: &Identity) -> RateLimitDecision {
        let quota = self.quota_for(identity);
        let outcome = self
            .counter
            .status(&identity.key(), RESOURCE_MESSAGE, quota.counter_limit())
            .await;
        RateLimitDecision::from_counter(identity, quota, &outcome, false)
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
