//! Configuration management for Academia Core

use crate::ratelimit::WindowRule;
use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Gating pipeline configuration
    pub gate: GateConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL for the shared rate-limit counter store. When unset the
    /// server falls back to the in-process counter table.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

/// Rate limiting configuration
///
/// Two independent route classes share the same window length but carry
/// their own limits and counters: `auth` covers credential-sensitive
/// endpoints, `general` covers everything else.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Rule for the `auth` route class
    pub auth: WindowRule,
    /// Rule for the `general` route class
    pub general: WindowRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: WindowRule {
                limit: 100,
                window_secs: 900,
            },
            general: WindowRule {
                limit: 1000,
                window_secs: 900,
            },
        }
    }
}

/// Gating pipeline configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Upper bound on school/user store round-trips. A lookup that does not
    /// complete within this budget fails the request closed.
    pub lookup_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER")
                    .unwrap_or_else(|_| "https://academia-hub.app".to_string()),
                access_token_ttl_secs: env::var("JWT_ACCESS_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .unwrap_or(900),
                refresh_token_ttl_secs: env::var("JWT_REFRESH_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()
                    .unwrap_or(604800),
            },
            rate_limit: {
                let window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .unwrap_or(900);

                RateLimitConfig {
                    enabled: env::var("RATE_LIMIT_ENABLED")
                        .map(|s| s.to_lowercase() != "false")
                        .unwrap_or(true),
                    auth: WindowRule {
                        limit: env::var("RATE_LIMIT_AUTH_MAX")
                            .unwrap_or_else(|_| "100".to_string())
                            .parse()
                            .unwrap_or(100),
                        window_secs,
                    },
                    general: WindowRule {
                        limit: env::var("RATE_LIMIT_GENERAL_MAX")
                            .unwrap_or_else(|_| "1000".to_string())
                            .parse()
                            .unwrap_or(1000),
                        window_secs,
                    },
                }
            },
            gate: GateConfig {
                lookup_timeout_ms: env::var("GATE_LOOKUP_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
