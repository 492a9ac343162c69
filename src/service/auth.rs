//! Authentication service
//!
//! The login flow runs after the gating pipeline, so the school is already
//! resolved and its subscription verified. This service only has to match
//! the credential to a user of that school and mint the token pair.

use crate::domain::{Role, School, User, UserStatus};
use crate::error::{AppError, Result};
use crate::jwt::JwtManager;
use crate::repository::UserRepository;
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Login request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

/// Refresh request body
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: String,
}

/// User fields safe to echo back to the client
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub school_id: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            school_id: user.school_id.to_string(),
        }
    }
}

/// Successful login/refresh response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt_manager: JwtManager,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, jwt_manager: JwtManager) -> Self {
        Self { users, jwt_manager }
    }

    /// Authenticate a user of the resolved school and issue a token pair.
    ///
    /// Accounts of other schools respond as unknown users so the login
    /// endpoint cannot be used to probe for addresses across tenants.
    pub async fn login(&self, school: &School, input: &LoginInput) -> Result<TokenResponse> {
        input.validate()?;

        let user = self
            .users
            .find_by_email(&input.email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if user.role != Role::SuperAdmin && user.school_id != school.id {
            return Err(AppError::Unauthorized("User not found".to_string()));
        }

        if user.status != UserStatus::Active {
            return Err(AppError::Unauthorized("Account disabled".to_string()));
        }

        if !password_matches(&user.password_hash, &input.password) {
            return Err(AppError::Unauthorized("Invalid password".to_string()));
        }

        self.issue_tokens(&user)
    }

    /// Exchange a refresh token for a fresh pair.
    ///
    /// The subject is re-read from the store so disabled or deleted
    /// accounts cannot keep refreshing.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let claims = self
            .jwt_manager
            .verify_refresh_token(refresh_token)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user_id = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AppError::Unauthorized("Account disabled".to_string()));
        }

        self.issue_tokens(&user)
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: self.jwt_manager.create_access_token(user)?,
            refresh_token: self.jwt_manager.create_refresh_token(user)?,
            user: UserSummary::from(user),
        })
    }
}

/// Hash a password for storage (used at provisioning time)
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

/// Constant-time verification against a stored hash.
///
/// A malformed stored hash verifies as a mismatch rather than an error, so
/// a corrupt row reads as a failed login instead of a 500.
fn password_matches(stored_hash: &str, password: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
