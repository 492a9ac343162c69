//! Common test utilities
//!
//! The gating pipeline is exercised through the real axum router, with
//! in-memory repository implementations standing in for the MySQL store.

#![allow(dead_code)]

use academia_core::config::{
    Config, DatabaseConfig, GateConfig, JwtConfig, RateLimitConfig, RedisConfig,
};
use academia_core::domain::{
    CreateSchoolInput, CreateUserInput, Role, School, SchoolStatus, StringUuid, User, UserStatus,
};
use academia_core::error::{AppError, Result};
use academia_core::jwt::JwtManager;
use academia_core::middleware::GateState;
use academia_core::pipeline::Gatekeeper;
use academia_core::policy::RoutePolicies;
use academia_core::ratelimit::InMemoryRateLimitStore;
use academia_core::repository::{SchoolRepository, UserRepository};
use academia_core::server::{build_router, AppState};
use academia_core::service::auth::hash_password;
use academia_core::service::AuthService;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::{Arc, RwLock};
use tower::ServiceExt;

/// In-memory school store
#[derive(Default)]
pub struct InMemorySchoolRepository {
    schools: RwLock<Vec<School>>,
}

#[async_trait]
impl SchoolRepository for InMemorySchoolRepository {
    async fn create(&self, input: &CreateSchoolInput) -> Result<School> {
        let now = Utc::now();
        let school = School {
            id: StringUuid::new_v4(),
            name: input.name.clone(),
            subdomain: input.subdomain.to_lowercase(),
            settings: input.settings.clone().unwrap_or_default(),
            status: SchoolStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.schools.write().unwrap().push(school.clone());
        Ok(school)
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<School>> {
        Ok(self
            .schools
            .read()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<School>> {
        let subdomain = subdomain.to_lowercase();
        Ok(self
            .schools
            .read()
            .unwrap()
            .iter()
            .find(|s| s.subdomain == subdomain)
            .cloned())
    }

    async fn update_status(&self, id: StringUuid, status: SchoolStatus) -> Result<School> {
        let mut schools = self.schools.write().unwrap();
        let school = schools
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("School {} not found", id)))?;
        school.status = status;
        school.updated_at = Utc::now();
        Ok(school.clone())
    }
}

/// In-memory user store
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserRepository {
    /// Flip an account's status directly (administrative action in tests)
    pub fn set_status(&self, id: StringUuid, status: UserStatus) {
        let mut users = self.users.write().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.status = status;
        }
    }

    /// Remove a user entirely, leaving any issued tokens orphaned
    pub fn remove(&self, id: StringUuid) {
        self.users.write().unwrap().retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: StringUuid::new_v4(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            role: input.role,
            school_id: input.school_id,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.users.write().unwrap().push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }
}

/// A fully wired application backed by in-memory stores
pub struct TestApp {
    pub router: Router,
    pub schools: Arc<InMemorySchoolRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub jwt: JwtManager,
}

pub fn test_config(rate_limit: RateLimitConfig) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        database: DatabaseConfig {
            url: "mysql://localhost/academia_test".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        redis: RedisConfig { url: None },
        jwt: JwtConfig {
            secret: "integration-test-secret-key".to_string(),
            issuer: "https://academia.test".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604800,
        },
        rate_limit,
        gate: GateConfig::default(),
    }
}

/// Build the app with the default production limits
pub fn build_app() -> TestApp {
    build_app_with(RateLimitConfig::default())
}

/// Build the app with custom rate limits
pub fn build_app_with(rate_limit: RateLimitConfig) -> TestApp {
    let config = test_config(rate_limit);

    let schools = Arc::new(InMemorySchoolRepository::default());
    let users = Arc::new(InMemoryUserRepository::default());
    let jwt = JwtManager::new(config.jwt.clone());

    let gatekeeper = Arc::new(Gatekeeper::standard(
        Arc::new(InMemoryRateLimitStore::new()),
        config.rate_limit.clone(),
        schools.clone(),
        users.clone(),
        jwt.clone(),
        &config.gate,
    ));
    let gate = GateState::new(gatekeeper, Arc::new(RoutePolicies::standard()));

    // Lazy pool: never actually connects, only the /ready probe would touch it
    let db_pool = MySqlPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");

    let state = AppState {
        config: Arc::new(config),
        db_pool,
        auth_service: Arc::new(AuthService::new(users.clone(), jwt.clone())),
        metrics_handle: None,
    };

    TestApp {
        router: build_router(state, gate),
        schools,
        users,
        jwt,
    }
}

/// Create a school with the given subscription status
pub async fn seed_school(app: &TestApp, subdomain: &str, status: SchoolStatus) -> School {
    let school = app
        .schools
        .create(&CreateSchoolInput {
            name: format!("School {}", subdomain),
            subdomain: subdomain.to_string(),
            settings: None,
        })
        .await
        .unwrap();

    if status == SchoolStatus::Active {
        school
    } else {
        app.schools.update_status(school.id, status).await.unwrap()
    }
}

/// Create an active user of a school
pub async fn seed_user(
    app: &TestApp,
    school: &School,
    email: &str,
    password: &str,
    role: Role,
) -> User {
    app.users
        .create(&CreateUserInput {
            email: email.to_string(),
            password_hash: hash_password(password).unwrap(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            school_id: school.id,
        })
        .await
        .unwrap()
}

/// Request description for [`send`]
pub struct TestRequest<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub host: Option<&'a str>,
    pub token: Option<&'a str>,
    pub ip: &'a str,
    pub body: Option<serde_json::Value>,
}

impl<'a> TestRequest<'a> {
    pub fn get(uri: &'a str) -> Self {
        Self {
            method: "GET",
            uri,
            host: None,
            token: None,
            ip: "127.0.0.1",
            body: None,
        }
    }

    pub fn post(uri: &'a str, body: serde_json::Value) -> Self {
        Self {
            method: "POST",
            uri,
            host: None,
            token: None,
            ip: "127.0.0.1",
            body: Some(body),
        }
    }

    pub fn host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }

    pub fn token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    pub fn ip(mut self, ip: &'a str) -> Self {
        self.ip = ip;
        self
    }
}

/// Drive one request through the router, returning status and JSON body
pub async fn send(router: &Router, request: TestRequest<'_>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(request.method)
        .uri(request.uri)
        .header("x-forwarded-for", request.ip);

    if let Some(host) = request.host {
        builder = builder.header("host", host);
    }
    if let Some(token) = request.token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let req = match request.body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}

/// Shorthand for a login attempt against a school host
pub fn login_request<'a>(host: &'a str, email: &'a str, password: &'a str, ip: &'a str) -> TestRequest<'a> {
    TestRequest::post(
        "/api/v1/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .host(host)
    .ip(ip)
}
