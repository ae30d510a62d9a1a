//! Authentication REST route handlers for Tollgate
//!
//! - `POST /api/auth/register` - Create an account
//! - `POST /api/auth/login` - Exchange credentials for a token pair
//! - `POST /api/auth/refresh` - Rotate a refresh token into a new pair
//! - `POST /api/auth/logout` - End the caller's session
//! - `GET /api/auth/profile` - Caller's profile
//! - `PUT /api/auth/profile` - Edit any user's profile (admin)
//!
//! Successful responses use the `{code, message, data?}` envelope.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::{ProfileResponse, TokenPair, UserRole, UserStatus};
use crate::services::{ProfileEdit, Registration};

use super::AppState;

/// Success envelope
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn empty() -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: None,
        }
    }
}

// ========== Request Types ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Profile edit; omitted fields stay as they are
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditProfileRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

// ========== Route Handlers ==========

pub(super) async fn register(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    state
        .auth
        .register(
            Registration {
                user_name: request.user_name,
                email: request.email,
                password: request.password,
                role: request.role,
            },
            caller.as_ref(),
        )
        .await?;

    Ok(Json(Envelope::empty()))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Envelope<TokenPair>>> {
    let tokens = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(Envelope::success(tokens)))
}

pub(super) async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<Envelope<TokenPair>>> {
    let tokens = state.auth.refresh(&request.refresh_token).await?;
    Ok(Json(Envelope::success(tokens)))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<Envelope<()>>> {
    state.auth.logout(caller.user_id).await?;
    Ok(Json(Envelope::empty()))
}

pub(super) async fn get_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> ApiResult<Json<Envelope<ProfileResponse>>> {
    let profile = state.auth.get_profile(caller.user_id).await?;
    Ok(Json(Envelope::success(profile)))
}

pub(super) async fn edit_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(request): Json<EditProfileRequest>,
) -> ApiResult<Json<Envelope<ProfileResponse>>> {
    tracing::debug!(admin_id = %caller.user_id, target = %request.user_id, "Editing profile");

    let profile = state
        .auth
        .edit_profile(
            request.user_id,
            ProfileEdit {
                user_name: request.user_name,
                email: request.email,
                password: request.password,
                role: request.role,
                status: request.status,
            },
        )
        .await?;

    Ok(Json(Envelope::success(profile)))
}
