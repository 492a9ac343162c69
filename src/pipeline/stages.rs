//! The five gating stages

use super::{GateContext, Principal, RequestMeta, Stage};
use crate::config::RateLimitConfig;
use crate::domain::{Role, SchoolStatus, StringUuid, UserStatus};
use crate::error::{AppError, Result};
use crate::jwt::JwtManager;
use crate::ratelimit::{counter_key, RateLimitStore, RouteClass};
use crate::repository::{SchoolRepository, UserRepository};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the subdomain label from a Host header value.
///
/// The port is ignored; the header must carry at least two dot-separated
/// labels (`test-school.test` passes, `malformed` does not). The label is
/// lowercased so lookup is case-insensitive.
pub fn parse_subdomain(host: &str) -> Result<String> {
    let host = host.split(':').next().unwrap_or(host);
    let mut labels = host.split('.');

    let first = labels.next().unwrap_or("");
    if first.is_empty() || labels.next().is_none() {
        return Err(AppError::BadRequest("Invalid host header".to_string()));
    }

    Ok(first.to_ascii_lowercase())
}

/// Rate gate: per-client, per-class fixed-window counters.
///
/// Runs first so abusive clients are turned away before any store
/// round-trip happens on their behalf.
pub struct RateStage {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateStage {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl Stage for RateStage {
    fn name(&self) -> &'static str {
        "rate"
    }

    async fn evaluate(&self, meta: &RequestMeta, ctx: &mut GateContext) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let class = meta.classification.rate_class;
        let rule = match class {
            RouteClass::Auth => self.config.auth,
            RouteClass::General => self.config.general,
        };

        let key = counter_key(class, &meta.client_ip);
        let now = unix_now();
        let decision = self.store.check_and_increment(&key, &rule, now).await?;

        if !decision.allowed {
            metrics::counter!(
                "academia_rate_limit_throttled_total",
                "class" => class.as_str()
            )
            .increment(1);
            return Err(AppError::TooManyRequests {
                message: class.limit_message().to_string(),
                retry_after_secs: decision.reset_at.saturating_sub(now),
            });
        }

        ctx.rate = Some(decision);
        Ok(())
    }
}

/// Tenant gate: resolve the Host header to a school record.
pub struct TenantStage {
    schools: Arc<dyn SchoolRepository>,
    lookup_timeout: Duration,
}

impl TenantStage {
    pub fn new(schools: Arc<dyn SchoolRepository>, lookup_timeout: Duration) -> Self {
        Self {
            schools,
            lookup_timeout,
        }
    }
}

#[async_trait]
impl Stage for TenantStage {
    fn name(&self) -> &'static str {
        "tenant"
    }

    async fn evaluate(&self, meta: &RequestMeta, ctx: &mut GateContext) -> Result<()> {
        if !meta.classification.requires_school {
            return Ok(());
        }

        let host = meta
            .host
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Invalid host header".to_string()))?;
        let subdomain = parse_subdomain(host)?;

        let school = tokio::time::timeout(
            self.lookup_timeout,
            self.schools.find_by_subdomain(&subdomain),
        )
        .await
        .map_err(|_| AppError::Internal(anyhow::anyhow!("school lookup timed out")))??
        .ok_or_else(|| AppError::NotFound("School not found".to_string()))?;

        ctx.school = Some(school);
        Ok(())
    }
}

/// Subscription gate: only schools with an active subscription pass.
///
/// `Suspended` has no dedicated copy yet, so it fails closed with the
/// inactive message rather than inventing new wording.
pub struct SubscriptionStage;

#[async_trait]
impl Stage for SubscriptionStage {
    fn name(&self) -> &'static str {
        "subscription"
    }

    async fn evaluate(&self, _meta: &RequestMeta, ctx: &mut GateContext) -> Result<()> {
        let Some(school) = &ctx.school else {
            return Ok(());
        };

        match school.status {
            SchoolStatus::Active => Ok(()),
            SchoolStatus::Expired => Err(AppError::Forbidden(
                "School subscription has expired".to_string(),
            )),
            SchoolStatus::Inactive | SchoolStatus::Suspended => Err(AppError::Forbidden(
                "School subscription is not active".to_string(),
            )),
        }
    }
}

/// Identity gate: verify the bearer credential and derive the principal.
///
/// The subject is re-read from the user store on every request; the token
/// alone never vouches for an account that no longer exists or was disabled.
pub struct IdentityStage {
    users: Arc<dyn UserRepository>,
    jwt_manager: JwtManager,
    lookup_timeout: Duration,
}

impl IdentityStage {
    pub fn new(users: Arc<dyn UserRepository>, jwt_manager: JwtManager, lookup_timeout: Duration) -> Self {
        Self {
            users,
            jwt_manager,
            lookup_timeout,
        }
    }
}

#[async_trait]
impl Stage for IdentityStage {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn evaluate(&self, meta: &RequestMeta, ctx: &mut GateContext) -> Result<()> {
        if !meta.classification.requires_auth {
            return Ok(());
        }

        let token = meta
            .bearer_token
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        let claims = self
            .jwt_manager
            .verify_access_token(token)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user_id = StringUuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user = tokio::time::timeout(self.lookup_timeout, self.users.find_by_id(user_id))
            .await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("user lookup timed out")))??
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AppError::Unauthorized("Account disabled".to_string()));
        }

        ctx.principal = Some(Principal {
            user_id: user.id,
            role: user.role,
            school_id: user.school_id,
            expires_at: claims.exp,
        });
        Ok(())
    }
}

/// Access gate: role and tenant-scope authorization.
pub struct AccessStage;

#[async_trait]
impl Stage for AccessStage {
    fn name(&self) -> &'static str {
        "access"
    }

    async fn evaluate(&self, meta: &RequestMeta, ctx: &mut GateContext) -> Result<()> {
        if !meta.classification.requires_auth {
            return Ok(());
        }

        let principal = ctx.principal.as_ref().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("access stage reached without a principal"))
        })?;

        if !meta.classification.allowed_roles.contains(&principal.role) {
            return Err(AppError::Forbidden("Insufficient permissions".to_string()));
        }

        // A school-scoped route demands that the caller belongs to the
        // resolved school; platform operators cross tenant boundaries.
        if meta.classification.requires_school {
            if let Some(school) = &ctx.school {
                if principal.role != Role::SuperAdmin && principal.school_id != school.id {
                    return Err(AppError::Forbidden("Insufficient permissions".to_string()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::domain::{School, User};
    use crate::policy::{RouteClassification, ADMINS, ALL_ROLES};
    use crate::ratelimit::{InMemoryRateLimitStore, WindowRule};
    use crate::repository::school::MockSchoolRepository;
    use crate::repository::user::MockUserRepository;
    use mockall::predicate::*;

    fn classification(requires_school: bool, requires_auth: bool) -> RouteClassification {
        RouteClassification {
            requires_school,
            requires_auth,
            allowed_roles: ALL_ROLES,
            rate_class: RouteClass::General,
        }
    }

    fn meta_for(host: Option<&str>, token: Option<String>, c: RouteClassification) -> RequestMeta {
        RequestMeta {
            method: "GET".to_string(),
            path: "/api/v1/students".to_string(),
            host: host.map(String::from),
            bearer_token: token,
            client_ip: "10.0.0.1".to_string(),
            classification: c,
        }
    }

    fn jwt_manager() -> JwtManager {
        JwtManager::new(JwtConfig {
            secret: "stage-test-secret".to_string(),
            issuer: "https://academia.test".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604800,
        })
    }

    fn user_in(school_id: StringUuid, role: Role) -> User {
        User {
            id: StringUuid::new_v4(),
            email: "user@test-school.test".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            school_id,
            status: UserStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_parse_subdomain() {
        assert_eq!(parse_subdomain("test-school.test").unwrap(), "test-school");
        assert_eq!(parse_subdomain("Test-School.Test").unwrap(), "test-school");
        assert_eq!(
            parse_subdomain("test-school.academia-hub.app:8080").unwrap(),
            "test-school"
        );
        assert!(matches!(
            parse_subdomain("malformed"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_subdomain("malformed:8080"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_subdomain(".test"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(parse_subdomain(""), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_tenant_stage_resolves_school() {
        let mut schools = MockSchoolRepository::new();
        let school = School {
            subdomain: "test-school".to_string(),
            ..School::default()
        };
        let school_clone = school.clone();
        schools
            .expect_find_by_subdomain()
            .with(eq("test-school"))
            .returning(move |_| Ok(Some(school_clone.clone())));

        let stage = TenantStage::new(Arc::new(schools), Duration::from_secs(2));
        let meta = meta_for(Some("test-school.test"), None, classification(true, false));
        let mut ctx = GateContext::default();

        stage.evaluate(&meta, &mut ctx).await.unwrap();
        assert_eq!(ctx.school.unwrap().id, school.id);
    }

    #[tokio::test]
    async fn test_tenant_stage_unknown_subdomain_is_404() {
        let mut schools = MockSchoolRepository::new();
        schools
            .expect_find_by_subdomain()
            .returning(|_| Ok(None));

        let stage = TenantStage::new(Arc::new(schools), Duration::from_secs(2));
        let meta = meta_for(Some("ghost.test"), None, classification(true, false));
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "School not found"));
    }

    #[tokio::test]
    async fn test_tenant_stage_missing_host_is_400() {
        let schools = MockSchoolRepository::new();
        let stage = TenantStage::new(Arc::new(schools), Duration::from_secs(2));
        let meta = meta_for(None, None, classification(true, false));
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid host header"));
    }

    #[tokio::test]
    async fn test_tenant_stage_skipped_when_not_required() {
        // No expectations: any lookup would panic the mock
        let schools = MockSchoolRepository::new();
        let stage = TenantStage::new(Arc::new(schools), Duration::from_secs(2));
        let meta = meta_for(None, None, classification(false, false));
        let mut ctx = GateContext::default();

        stage.evaluate(&meta, &mut ctx).await.unwrap();
        assert!(ctx.school.is_none());
    }

    #[tokio::test]
    async fn test_subscription_stage_statuses() {
        let meta = meta_for(Some("s.test"), None, classification(true, false));

        for (status, expected) in [
            (SchoolStatus::Active, None),
            (
                SchoolStatus::Inactive,
                Some("School subscription is not active"),
            ),
            (
                SchoolStatus::Expired,
                Some("School subscription has expired"),
            ),
            (
                SchoolStatus::Suspended,
                Some("School subscription is not active"),
            ),
        ] {
            let mut ctx = GateContext {
                school: Some(School {
                    status,
                    ..School::default()
                }),
                ..Default::default()
            };

            let result = SubscriptionStage.evaluate(&meta, &mut ctx).await;
            match expected {
                None => assert!(result.is_ok()),
                Some(message) => {
                    let err = result.unwrap_err();
                    assert!(
                        matches!(err, AppError::Forbidden(ref m) if m == message),
                        "status {:?}",
                        status
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_identity_stage_missing_token() {
        let users = MockUserRepository::new();
        let stage = IdentityStage::new(Arc::new(users), jwt_manager(), Duration::from_secs(2));
        let meta = meta_for(Some("s.test"), None, classification(true, true));
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Authentication required"));
    }

    #[tokio::test]
    async fn test_identity_stage_garbage_token() {
        let users = MockUserRepository::new();
        let stage = IdentityStage::new(Arc::new(users), jwt_manager(), Duration::from_secs(2));
        let meta = meta_for(
            Some("s.test"),
            Some("not.a.jwt".to_string()),
            classification(true, true),
        );
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid or expired token"));
    }

    #[tokio::test]
    async fn test_identity_stage_unknown_subject() {
        let jwt = jwt_manager();
        let user = user_in(StringUuid::new_v4(), Role::Teacher);
        let token = jwt.create_access_token(&user).unwrap();

        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|_| Ok(None));

        let stage = IdentityStage::new(Arc::new(users), jwt, Duration::from_secs(2));
        let meta = meta_for(Some("s.test"), Some(token), classification(true, true));
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "User not found"));
    }

    #[tokio::test]
    async fn test_identity_stage_disabled_account() {
        let jwt = jwt_manager();
        let mut user = user_in(StringUuid::new_v4(), Role::Teacher);
        let token = jwt.create_access_token(&user).unwrap();
        user.status = UserStatus::Disabled;

        let mut users = MockUserRepository::new();
        let stored = user.clone();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));

        let stage = IdentityStage::new(Arc::new(users), jwt, Duration::from_secs(2));
        let meta = meta_for(Some("s.test"), Some(token), classification(true, true));
        let mut ctx = GateContext::default();

        let err = stage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Account disabled"));
    }

    #[tokio::test]
    async fn test_identity_stage_derives_principal_from_store() {
        let jwt = jwt_manager();
        let user = user_in(StringUuid::new_v4(), Role::Teacher);
        let token = jwt.create_access_token(&user).unwrap();

        // Role was changed in the store after the token was issued
        let mut promoted = user.clone();
        promoted.role = Role::SchoolAdmin;

        let mut users = MockUserRepository::new();
        let stored = promoted.clone();
        users
            .expect_find_by_id()
            .with(eq(user.id))
            .returning(move |_| Ok(Some(stored.clone())));

        let stage = IdentityStage::new(Arc::new(users), jwt, Duration::from_secs(2));
        let meta = meta_for(Some("s.test"), Some(token), classification(true, true));
        let mut ctx = GateContext::default();

        stage.evaluate(&meta, &mut ctx).await.unwrap();
        let principal = ctx.principal.unwrap();
        assert_eq!(principal.role, Role::SchoolAdmin);
        assert_eq!(principal.user_id, user.id);
    }

    #[tokio::test]
    async fn test_access_stage_role_not_allowed() {
        let school = School::default();
        let meta = RequestMeta {
            classification: RouteClassification {
                requires_school: true,
                requires_auth: true,
                allowed_roles: ADMINS,
                rate_class: RouteClass::General,
            },
            ..meta_for(Some("s.test"), None, classification(true, true))
        };
        let mut ctx = GateContext {
            school: Some(school.clone()),
            principal: Some(Principal {
                user_id: StringUuid::new_v4(),
                role: Role::Student,
                school_id: school.id,
                expires_at: 0,
            }),
            ..Default::default()
        };

        let err = AccessStage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "Insufficient permissions"));
    }

    #[tokio::test]
    async fn test_access_stage_cross_school_rejected() {
        let school = School::default();
        let meta = meta_for(Some("s.test"), None, classification(true, true));
        let mut ctx = GateContext {
            school: Some(school),
            principal: Some(Principal {
                user_id: StringUuid::new_v4(),
                role: Role::SchoolAdmin,
                school_id: StringUuid::new_v4(),
                expires_at: 0,
            }),
            ..Default::default()
        };

        let err = AccessStage.evaluate(&meta, &mut ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_access_stage_super_admin_crosses_schools() {
        let school = School::default();
        let meta = meta_for(Some("s.test"), None, classification(true, true));
        let mut ctx = GateContext {
            school: Some(school),
            principal: Some(Principal {
                user_id: StringUuid::new_v4(),
                role: Role::SuperAdmin,
                school_id: StringUuid::new_v4(),
                expires_at: 0,
            }),
            ..Default::default()
        };

        assert!(AccessStage.evaluate(&meta, &mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_stage_rejects_with_class_message() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let config = RateLimitConfig {
            enabled: true,
            auth: WindowRule {
                limit: 2,
                window_secs: 900,
            },
            general: WindowRule {
                limit: 1000,
                window_secs: 900,
            },
        };
        let stage = RateStage::new(store, config);
        let meta = RequestMeta {
            classification: RouteClassification {
                requires_school: false,
                requires_auth: false,
                allowed_roles: ALL_ROLES,
                rate_class: RouteClass::Auth,
            },
            ..meta_for(None, None, classification(false, false))
        };

        let mut ctx = GateContext::default();
        stage.evaluate(&meta, &mut ctx).await.unwrap();
        assert!(ctx.rate.is_some());

        let err = stage
            .evaluate(&meta, &mut GateContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::TooManyRequests { ref message, .. }
                if message == "Too many authentication attempts, retry later"
        ));
    }

    #[tokio::test]
    async fn test_rate_stage_disabled_always_passes() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let config = RateLimitConfig {
            enabled: false,
            auth: WindowRule {
                limit: 1,
                window_secs: 900,
            },
            general: WindowRule {
                limit: 1,
                window_secs: 900,
            },
        };
        let stage = RateStage::new(store, config);
        let meta = meta_for(None, None, classification(false, false));

        for _ in 0..10 {
            stage
                .evaluate(&meta, &mut GateContext::default())
                .await
                .unwrap();
        }
    }
}
