//! REST API handlers
//!
//! Handlers consume the `RequestContext` assembled by the gating pipeline;
//! they never re-check tenant, subscription, credential, or role.

pub mod auth;
pub mod health;
pub mod metrics;
