//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::middleware::{
    gate_middleware, inject_client_ip, security_headers_middleware, GateState,
};
use crate::pipeline::Gatekeeper;
use crate::policy::RoutePolicies;
use crate::ratelimit::{InMemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
use crate::repository::{
    SchoolRepository, SchoolRepositoryImpl, UserRepository, UserRepositoryImpl,
};
use crate::service::AuthService;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub auth_service: Arc<AuthService>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Run the server
pub async fn run(config: Config, metrics_handle: Option<PrometheusHandle>) -> Result<()> {
    // Create database connection pool
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    // Create repositories
    let school_repo: Arc<dyn SchoolRepository> =
        Arc::new(SchoolRepositoryImpl::new(db_pool.clone()));
    let user_repo: Arc<dyn UserRepository> = Arc::new(UserRepositoryImpl::new(db_pool.clone()));

    // Create JWT manager
    let jwt_manager = JwtManager::new(config.jwt.clone());

    // Pick the rate-limit counter store: shared Redis counters when
    // configured, in-process counters otherwise
    let rate_store: Arc<dyn RateLimitStore> = match &config.redis.url {
        Some(url) => match RedisRateLimitStore::connect(url).await {
            Ok(store) => {
                info!("Connected to Redis rate-limit store");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Redis unavailable ({}), falling back to in-process rate-limit counters",
                    e
                );
                Arc::new(InMemoryRateLimitStore::new())
            }
        },
        None => {
            info!("REDIS_URL not set, using in-process rate-limit counters");
            Arc::new(InMemoryRateLimitStore::new())
        }
    };

    // Assemble the gating pipeline
    let gatekeeper = Arc::new(Gatekeeper::standard(
        rate_store,
        config.rate_limit.clone(),
        school_repo,
        user_repo.clone(),
        jwt_manager.clone(),
        &config.gate,
    ));
    let policies = Arc::new(RoutePolicies::standard());

    // Create services
    let auth_service = Arc::new(AuthService::new(user_repo, jwt_manager));

    // Create app state
    let state = AppState {
        config: Arc::new(config.clone()),
        db_pool,
        auth_service,
        metrics_handle,
    };
    let gate = GateState::new(gatekeeper, policies);

    let app = build_router(state, gate);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Build the HTTP router
///
/// The gating layer wraps every route; routes that should pass without a
/// school or credential say so in the route policy table, not by sitting
/// outside the layer.
pub fn build_router(state: AppState, gate: GateState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Infrastructure endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        .route("/metrics", get(api::metrics::metrics))
        // Auth endpoints
        .route("/api/v1/auth/login", post(api::auth::login))
        .route("/api/v1/auth/refresh", post(api::auth::refresh))
        .route("/api/v1/auth/me", get(api::auth::me))
        // Innermost layer runs last: the gate sees the final request
        .layer(axum::middleware::from_fn_with_state(gate, gate_middleware))
        .layer(axum::middleware::from_fn(inject_client_ip))
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
