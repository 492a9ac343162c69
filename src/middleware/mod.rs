//! HTTP middleware for Academia Core
//!
//! This module adapts the gating pipeline to axum:
//! - the gate middleware extracts request metadata, runs the pipeline, and
//!   either injects the assembled `RequestContext` or writes the rejection
//! - client IP injection for direct (non-proxied) connections
//! - standard security headers on every response

pub mod client_ip;
pub mod gate;
pub mod security_headers;

pub use client_ip::inject_client_ip;
pub use gate::{gate_middleware, GateState};
pub use security_headers::security_headers_middleware;
