//! User and session models for Tollgate
//!
//! A user owns at most one active session, represented by the refresh token
//! currently stored on the record together with the fingerprint of the
//! public key that signed it. Revoked refresh tokens are kept on the record
//! as an append-only trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User role enum matching PostgreSQL user_role type
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Account status matching PostgreSQL user_status type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

/// Entry in a user's revoked refresh token trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedToken {
    pub token: String,
    pub reason: String,
    pub revoked_at: DateTime<Utc>,
}

impl RevokedToken {
    pub fn logout(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            reason: "logout".to_string(),
            revoked_at: Utc::now(),
        }
    }
}

/// User account from the users table
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    pub user_name: String,

    /// Unique, stored lower-cased
    pub email: String,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,

    pub status: UserStatus,

    /// Empty when the user has no active session
    #[serde(skip_serializing)]
    pub refresh_token: String,

    /// SHA-256 of the public key bound to `refresh_token`
    #[serde(skip_serializing)]
    pub refresh_key_fingerprint: String,

    #[serde(skip_serializing)]
    #[sqlx(json)]
    pub revoked_tokens: Vec<RevokedToken>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_session(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked_tokens.iter().any(|entry| entry.token == token)
    }
}

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Partial update applied by profile edits; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.status.is_none()
    }
}

/// Refresh token and the key fingerprint it is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshBinding {
    pub token: String,
    pub key_fingerprint: String,
}

/// Caller identity established from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

/// Public profile returned by the profile endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            user_name: user.user_name,
            email: user.email,
            role: user.role,
            status: user.status,
        }
    }
}
