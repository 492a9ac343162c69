//! Gating middleware
//!
//! Thin axum adapter around [`Gatekeeper`]: all decisions live in the
//! pipeline stages; this layer only extracts what they need from the raw
//! request and translates the outcome into a response.

use crate::pipeline::{Gatekeeper, RequestMeta};
use crate::policy::RoutePolicies;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, header::HOST, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Shared state for the gating middleware
#[derive(Clone)]
pub struct GateState {
    pub gatekeeper: Arc<Gatekeeper>,
    pub policies: Arc<RoutePolicies>,
}

impl GateState {
    pub fn new(gatekeeper: Arc<Gatekeeper>, policies: Arc<RoutePolicies>) -> Self {
        Self {
            gatekeeper,
            policies,
        }
    }
}

/// Run the gating pipeline for one request.
///
/// On success the assembled `RequestContext` is inserted into the request
/// extensions for handlers to consume; on rejection the pipeline's error
/// becomes the response and the handler never runs.
pub async fn gate_middleware(
    State(gate): State<GateState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let meta = request_meta(&gate.policies, &request);

    match gate.gatekeeper.admit(&meta).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Extract the metadata the pipeline stages operate on
fn request_meta(policies: &RoutePolicies, request: &Request<Body>) -> RequestMeta {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    RequestMeta {
        classification: policies.classify(&method, &path),
        host: extract_host(request),
        bearer_token: extract_bearer_token(request),
        client_ip: extract_client_ip(request),
        method,
        path,
    }
}

fn extract_host(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| request.uri().host().map(|h| h.to_string()))
}

fn extract_bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn extract_client_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
