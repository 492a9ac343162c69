//! Authentication endpoints

use crate::error::{AppError, Result};
use crate::pipeline::RequestContext;
use crate::server::AppState;
use crate::service::auth::{LoginInput, RefreshInput, TokenResponse};
use axum::{extract::State, Extension, Json};
use serde::Serialize;

/// Authenticate against the school resolved from the Host header.
///
/// The gating pipeline has already resolved the school and verified its
/// subscription before this handler runs.
pub async fn login(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(input): Json<LoginInput>,
) -> Result<Json<TokenResponse>> {
    let school = context.school.as_ref().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("login route reached without a school"))
    })?;

    let response = state.auth_service.login(school, &input).await?;
    Ok(Json(response))
}

/// Exchange a refresh token for a fresh token pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshInput>,
) -> Result<Json<TokenResponse>> {
    let response = state.auth_service.refresh(&input.refresh_token).await?;
    Ok(Json(response))
}

/// The authenticated caller, as established by the gating pipeline
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub role: crate::domain::Role,
    pub school_id: String,
    pub expires_at: i64,
}

/// Echo the principal from the assembled request context
pub async fn me(Extension(context): Extension<RequestContext>) -> Result<Json<MeResponse>> {
    let principal = context.principal.as_ref().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("authenticated route reached without a principal"))
    })?;

    Ok(Json(MeResponse {
        user_id: principal.user_id.to_string(),
        role: principal.role,
        school_id: principal.school_id.to_string(),
        expires_at: principal.expires_at,
    }))
}
