//! In-process counter store
//!
//! One window cell per key inside a sharded concurrent map. The entry guard
//! holds the shard write lock for the duration of check-and-increment, so
//! rollover and increment are atomic per key while unrelated keys stay on
//! other shards and never contend.

use super::{RateDecision, RateLimitStore, WindowRule};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Counter state for one key
#[derive(Debug, Clone, Copy)]
struct Window {
    start: u64,
    count: u64,
}

/// Fixed-window counter table held in process memory
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        rule: &WindowRule,
        now_secs: u64,
    ) -> Result<RateDecision> {
        let window_start = rule.window_start(now_secs);

        let mut cell = self.windows.entry(key.to_string()).or_insert(Window {
            start: window_start,
            count: 0,
        });

        if cell.start != window_start {
            // Rollover: the stored window is stale, reset under the same
            // exclusive guard that performs the increment.
            cell.start = window_start;
            cell.count = 0;
        }

        cell.count += 1;
        let count = cell.count;
        drop(cell);

        Ok(RateDecision {
            allowed: count < rule.limit,
            remaining: rule.limit.saturating_sub(1).saturating_sub(count),
            reset_at: window_start + rule.window_secs,
        })
    }
}
