//! Process-local sliding-window store.
//!
//! DESIGN
//! ======
//! Sliding-window log backed by `HashMap<String, VecDeque<i64>>` of epoch-ms
//! timestamps behind a `std::sync::Mutex`. The lock is never held across an
//! await. Expired keys are swept at most once per `COMPACT_INTERVAL_MS`, and
//! only once the map is large, so a hit is O(1) amortized. Suitable for single-node deployments (`FAST_GATE_URL=memory://`)
//! and tests; multi-node deployments need the Redis store so every node sees
//! the same window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{FastGateError, WindowHit, WindowStore, window_ms};

/// Drop empty windows once the map grows past this many keys.
const COMPACT_THRESHOLD: usize = 10_000;
/// Minimum spacing between two full sweeps of the map.
const COMPACT_INTERVAL_MS: i64 = 60_000;

#[derive(Default)]
struct Windows {
    by_key: HashMap<String, VecDeque<i64>>,
    last_compact_ms: i64,
}

impl Windows {
    fn compact(&mut self, now_ms: i64, window_ms: i64) {
        if self.by_key.len() <= COMPACT_THRESHOLD
            || now_ms.saturating_sub(self.last_compact_ms) < COMPACT_INTERVAL_MS
        {
            return;
        }
        self.by_key.retain(|_, deque| {
            prune_window(deque, now_ms, window_ms);
            !deque.is_empty()
        });
        self.last_compact_ms = now_ms;
    }
}

#[derive(Clone, Default)]
pub struct MemoryWindowStore {
    inner: Arc<Mutex<Windows>>,
}

impl MemoryWindowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_at(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> WindowHit {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window_ms = window_ms(window);

        inner.compact(now_ms, window_ms);

        let deque = inner.by_key.entry(key.to_owned()).or_default();
        prune_window(deque, now_ms, window_ms);

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let allowed = deque.len() < limit;
        if allowed {
            deque.push_back(now_ms);
        }

        let reset_at_ms = deque
            .front()
            .map_or(now_ms, |&oldest| oldest)
            .saturating_add(window_ms);

        WindowHit { allowed, count: u32::try_from(deque.len()).unwrap_or(u32::MAX), reset_at_ms }
    }
}

#[async_trait::async_trait]
impl WindowStore for MemoryWindowStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> Result<WindowHit, FastGateError> {
        Ok(self.hit_at(key, limit, window, now_ms))
    }
}

fn prune_window(deque: &mut VecDeque<i64>, now_ms: i64, window_ms: i64) {
    while let Some(&front) = deque.front() {
        if now_ms.saturating_sub(front) >= window_ms {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
