//! Fixed-window rate limiting
//!
//! Counters are grouped into two independent route classes: `auth` for
//! credential-sensitive endpoints and `general` for everything else.
//! Exhausting one class never affects the other. The counter store is an
//! injected trait so the in-process table can be swapped for the shared
//! Redis store in multi-instance deployments without touching the pipeline.

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;

pub use self::memory::InMemoryRateLimitStore;
pub use self::redis::RedisRateLimitStore;

/// Rate-limit class assigned to a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Login, token refresh, password flows
    Auth,
    /// Everything else
    General,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Auth => "auth",
            RouteClass::General => "general",
        }
    }

    /// Message returned with a 429 for this class
    pub fn limit_message(&self) -> &'static str {
        match self {
            RouteClass::Auth => "Too many authentication attempts, retry later",
            RouteClass::General => "Too many requests, retry later",
        }
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests allowed per fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    /// Saturation point: the request whose post-increment count reaches
    /// this value is the first one rejected.
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
}

impl WindowRule {
    /// Start of the window containing `now_secs`
    pub fn window_start(&self, now_secs: u64) -> u64 {
        now_secs - (now_secs % self.window_secs)
    }
}

/// Outcome of a counter increment
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Further requests that would still be allowed in this window
    pub remaining: u64,
    /// Unix timestamp at which the window rolls over
    pub reset_at: u64,
}

/// Shared counter store
///
/// The increment must be a single atomic step per key: two concurrent
/// callers must never both observe a count below the limit when only one
/// slot remains.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_increment(
        &self,
        key: &str,
        rule: &WindowRule,
        now_secs: u64,
    ) -> Result<RateDecision>;
}

/// Build the counter key for a class and client identity.
///
/// Keyed on the client address only (not the resolved school): the rate
/// gate runs before tenant resolution, so the school is not yet known.
pub fn counter_key(class: RouteClass, client_ip: &str) -> String {
    format!("{}:{}", class.as_str(), client_ip)
}
