//! Request-gating pipeline
//!
//! Every inbound request passes a fixed, ordered chain of stages before any
//! domain handler runs:
//!
//! `RateGate → TenantGate → SubscriptionGate → IdentityGate → AccessGate`
//!
//! Each stage either advances the request or terminates it with a specific
//! status and message; no stage is retried within a request. The chain is an
//! explicit list of [`Stage`] objects driven by [`Gatekeeper::admit`], not a
//! nest of middlewares calling each other, so the control flow is visible in
//! one place.

pub mod stages;

use crate::config::{GateConfig, RateLimitConfig};
use crate::domain::{Role, School, StringUuid};
use crate::error::Result;
use crate::jwt::JwtManager;
use crate::policy::RouteClassification;
use crate::ratelimit::{RateDecision, RateLimitStore};
use crate::repository::{SchoolRepository, UserRepository};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use stages::{AccessStage, IdentityStage, RateStage, SubscriptionStage, TenantStage};

/// Everything a stage may look at, extracted from the HTTP request up front
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    /// Raw Host header value, if present
    pub host: Option<String>,
    /// Bearer token from the Authorization header, if present
    pub bearer_token: Option<String>,
    /// Client address as seen through proxy headers
    pub client_ip: String,
    pub classification: RouteClassification,
}

/// The authenticated caller, derived transiently from the credential
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: StringUuid,
    pub role: Role,
    pub school_id: StringUuid,
    /// Credential expiry (Unix timestamp)
    pub expires_at: i64,
}

/// Mutable state threaded through the stages of one request
#[derive(Debug, Default)]
pub struct GateContext {
    pub school: Option<School>,
    pub principal: Option<Principal>,
    pub rate: Option<RateDecision>,
}

/// Immutable per-request bundle handed to the domain handler
///
/// Constructed only after every required stage has passed; discarded when
/// the response is sent.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub school: Option<School>,
    pub principal: Option<Principal>,
    pub rate: Option<RateDecision>,
}

/// One check in the gating chain
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Advance the request or reject it. An `Err` terminates the chain and
    /// becomes the response.
    async fn evaluate(&self, meta: &RequestMeta, ctx: &mut GateContext) -> Result<()>;
}

/// Ordered chain of gating stages
pub struct Gatekeeper {
    stages: Vec<Box<dyn Stage>>,
}

impl Gatekeeper {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The production chain, in spec order
    pub fn standard(
        rate_store: Arc<dyn RateLimitStore>,
        rate_config: RateLimitConfig,
        schools: Arc<dyn SchoolRepository>,
        users: Arc<dyn UserRepository>,
        jwt_manager: JwtManager,
        gate_config: &GateConfig,
    ) -> Self {
        let lookup_timeout = Duration::from_millis(gate_config.lookup_timeout_ms);

        Self::new(vec![
            Box::new(RateStage::new(rate_store, rate_config)),
            Box::new(TenantStage::new(schools, lookup_timeout)),
            Box::new(SubscriptionStage),
            Box::new(IdentityStage::new(users, jwt_manager, lookup_timeout)),
            Box::new(AccessStage),
        ])
    }

    /// Run the chain for one request.
    ///
    /// Returns the assembled [`RequestContext`] on success; the first stage
    /// rejection short-circuits the rest.
    pub async fn admit(&self, meta: &RequestMeta) -> Result<RequestContext> {
        let mut ctx = GateContext::default();

        for stage in &self.stages {
            if let Err(err) = stage.evaluate(meta, &mut ctx).await {
                tracing::debug!(
                    stage = stage.name(),
                    method = %meta.method,
                    path = %meta.path,
                    "request rejected: {}",
                    err
                );
                metrics::counter!(
                    "academia_gate_rejections_total",
                    "stage" => stage.name()
                )
                .increment(1);
                return Err(err);
            }
        }

        Ok(RequestContext {
            school: ctx.school,
            principal: ctx.principal,
            rate: ctx.rate,
        })
    }
}
