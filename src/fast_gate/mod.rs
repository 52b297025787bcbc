//! Fast gate: coarse IP-keyed admission control for guest traffic.
//!
//! DESIGN
//! ======
//! Sliding-window log of request timestamps per client IP, held in an
//! in-memory store (Redis in production, a process-local map for single-node
//! deployments and tests). Two limits apply:
//! - recognized IPs: 10 requests per 24h
//! - the literal `unknown` bucket: 3 requests per 24h, since many distinct
//!   clients can collapse into it
//!
//! Authenticated callers never reach this layer.
//!
//! TRADE-OFFS
//! ==========
//! The gate fails open. A timeout or connection error returns
//! `allowed = true, degraded = true`; the accurate counter downstream still
//! enforces the real quota, so a cache outage degrades abuse resistance
//! instead of taking the chat service down.

pub mod memory;
pub mod redis_store;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;

use crate::config::FastGateConfig;

pub use memory::MemoryWindowStore;
pub use redis_store::RedisWindowStore;

#[derive(Debug, thiserror::Error)]
pub enum FastGateError {
    #[error("fast gate store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("fast gate store timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported fast gate url: {0}")]
    Url(String),
}

// =============================================================================
// STORE PORT
// =============================================================================

/// Result of one atomic sliding-window hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub allowed: bool,
    /// Requests recorded in the window after this hit.
    pub count: u32,
    /// Epoch-ms at which the oldest recorded request leaves the window.
    pub reset_at_ms: i64,
}

/// Atomic "prune, count, record-if-under-limit" against a keyed window.
#[async_trait::async_trait]
pub trait WindowStore: Send + Sync {
    async fn hit(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> Result<WindowHit, FastGateError>;
}

/// Open the store named by `FAST_GATE_URL`. Does not connect eagerly.
///
/// # Errors
///
/// Returns [`FastGateError::Url`] for unknown schemes and
/// [`FastGateError::Store`] if the Redis URL cannot be parsed.
pub fn open_store(url: &str) -> Result<Arc<dyn WindowStore>, FastGateError> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(MemoryWindowStore::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisWindowStore::open(url)?));
    }
    Err(FastGateError::Url(url.to_owned()))
}

// =============================================================================
// CLIENT IP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIp {
    Known(IpAddr),
    Unknown,
}

impl ClientIp {
    /// Resolve from `X-Forwarded-For` (first hop), else the peer address.
    /// Candidates that are not valid IPv4/IPv6 literals become `Unknown`.
    #[must_use]
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match forwarded {
            Some(candidate) => parse_ip(candidate).map_or(Self::Unknown, Self::Known),
            None => peer.map_or(Self::Unknown, |addr| Self::Known(addr.ip())),
        }
    }

    #[must_use]
    pub fn store_key(&self) -> String {
        match self {
            Self::Known(ip) => format!("fastgate:ip:{ip}"),
            Self::Unknown => "fastgate:ip:unknown".to_owned(),
        }
    }
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

// =============================================================================
// GATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateCheck {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
    /// Store was unreachable and the gate failed open.
    pub degraded: bool,
}

#[derive(Clone)]
pub struct FastGate {
    store: Arc<dyn WindowStore>,
    config: FastGateConfig,
}

impl FastGate {
    #[must_use]
    pub fn new(store: Arc<dyn WindowStore>, config: FastGateConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn limit_for(&self, ip: &ClientIp) -> u32 {
        match ip {
            ClientIp::Known(_) => self.config.known_ip_limit,
            ClientIp::Unknown => self.config.unknown_ip_limit,
        }
    }

    pub async fn check_ip(&self, ip: &ClientIp) -> GateCheck {
        self.check_ip_at(ip, now_ms()).await
    }

    /// Internal: check with explicit timestamp (for testing).
    async fn check_ip_at(&self, ip: &ClientIp, now_ms: i64) -> GateCheck {
        let limit = self.limit_for(ip);
        let window = self.config.window;
        let key = ip.store_key();

        let outcome = tokio::time::timeout(self.config.timeout, self.store.hit(&key, limit, window, now_ms))
            .await
            .unwrap_or(Err(FastGateError::Timeout(self.config.timeout)));

        match outcome {
            Ok(hit) => GateCheck {
                allowed: hit.allowed,
                limit,
                remaining: limit.saturating_sub(hit.count),
                reset_at_ms: hit.reset_at_ms,
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "fast gate unavailable; failing open");
                GateCheck {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_at_ms: now_ms.saturating_add(window_ms(window)),
                    degraded: true,
                }
            }
        }
    }
}

pub(crate) fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
