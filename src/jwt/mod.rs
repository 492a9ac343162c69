//! JWT token handling

use crate::config::JwtConfig;
use crate::domain::{Role, User};
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Audience for all tokens issued by this service
const AUDIENCE: &str = "academia";

/// Access token claims
///
/// The role and school carried here are informational; the identity gate
/// re-reads both from the user store on every request so that revocations
/// and role changes take effect before the token expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: String,
    /// Role at issuance time
    pub role: Role,
    /// Owning school ID
    pub school_id: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Token type discriminator (prevents token confusion attacks)
    #[serde(default)]
    pub token_type: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Refresh token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub school_id: String,
    pub iss: String,
    pub aud: String,
    /// Token type discriminator (prevents token confusion attacks)
    #[serde(default)]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
            algorithm: Algorithm::HS256,
        }
    }

    /// Create a Validation with a strict leeway (5 seconds) instead of the
    /// default 60 seconds so tokens expire promptly while still tolerating
    /// minor clock skew.
    fn strict_validation(&self) -> Validation {
        let mut v = Validation::new(self.algorithm);
        v.leeway = 5;
        v.set_audience(&[AUDIENCE]);
        v.set_issuer(&[&self.config.issuer]);
        v
    }

    /// Create an access token for an authenticated user
    pub fn create_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.access_token_ttl_secs);

        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            school_id: user.school_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: AUDIENCE.to_string(),
            token_type: "access".to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key).map_err(|e| AppError::Internal(e.into()))
    }

    /// Create a refresh token for an authenticated user
    pub fn create_refresh_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.refresh_token_ttl_secs);

        let claims = RefreshClaims {
            sub: user.id.to_string(),
            school_id: user.school_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: AUDIENCE.to_string(),
            token_type: "refresh".to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key).map_err(|e| AppError::Internal(e.into()))
    }

    /// Verify and decode an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let token_data =
            decode::<AccessClaims>(token, &self.decoding_key, &self.strict_validation())?;

        if token_data.claims.token_type != "access" {
            return Err(AppError::Unauthorized(
                "Invalid or expired token".to_string(),
            ));
        }

        Ok(token_data.claims)
    }

    /// Verify and decode a refresh token
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        let token_data =
            decode::<RefreshClaims>(token, &self.decoding_key, &self.strict_validation())?;

        if token_data.claims.token_type != "refresh" {
            return Err(AppError::Unauthorized(
                "Invalid or expired token".to_string(),
            ));
        }

        Ok(token_data.claims)
    }

    /// Get access token TTL in seconds
    pub fn access_token_ttl(&self) -> i64 {
        self.config.access_token_ttl_secs
    }
}
