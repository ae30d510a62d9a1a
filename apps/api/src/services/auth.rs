//! Token engine for Tollgate
//!
//! Issues and rotates RS256 token pairs, one active session per user:
//! - Register and login (Argon2id password hashing)
//! - Refresh with single-use rotation of the refresh token
//! - Logout onto the revoked token trail
//! - Access token authentication for the access-control layer
//!
//! Every pair is signed with a freshly generated key pair. The public half
//! travels inside the token; its fingerprint is stored with the refresh
//! token so a token signed by any other key is rejected.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthenticatedUser, NewUser, ProfileResponse, ProfileUpdate, RefreshBinding, RevokedToken,
    TokenKind, TokenPair, TokenPayload, User, UserRole, UserStatus,
};
use crate::repositories::SessionStore;
use crate::services::keys::{fingerprint, KeyPairProvider};
use crate::services::password::PasswordHasher;
use crate::services::token_codec::TokenCodec;

/// Token lifetimes and revoked trail retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Revoked entries older than this are pruned on the next append
    pub revoked_retention: Duration,
}

impl AuthConfig {
    /// Build a config; access tokens must expire strictly before refresh tokens
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> ApiResult<Self> {
        if access_ttl <= Duration::zero() {
            return Err(ApiError::Configuration(
                "access token lifetime must be positive".to_string(),
            ));
        }
        if access_ttl >= refresh_ttl {
            return Err(ApiError::Configuration(format!(
                "access token lifetime ({}s) must be shorter than refresh token lifetime ({}s)",
                access_ttl.num_seconds(),
                refresh_ttl.num_seconds()
            )));
        }

        Ok(Self {
            access_ttl,
            refresh_ttl,
            revoked_retention: refresh_ttl,
        })
    }

    /// Build from expiry strings (e.g., "2d", "15m")
    pub fn with_expiry_strings(access_expiry: &str, refresh_expiry: &str) -> ApiResult<Self> {
        let access = parse_duration_string(access_expiry).ok_or_else(|| {
            ApiError::Configuration(format!("invalid access token expiry '{}'", access_expiry))
        })?;
        let refresh = parse_duration_string(refresh_expiry).ok_or_else(|| {
            ApiError::Configuration(format!("invalid refresh token expiry '{}'", refresh_expiry))
        })?;
        Self::new(access, refresh)
    }

    pub fn with_revoked_retention(mut self, retention: Duration) -> Self {
        self.revoked_retention = retention;
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::days(2),
            refresh_ttl: Duration::days(3),
            revoked_retention: Duration::days(3),
        }
    }
}

/// Parse duration strings like "15m", "2d", "24h"
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() || !s.is_ascii() {
        return None;
    }

    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: i64 = num_str.parse().ok()?;
    if num <= 0 {
        return None;
    }

    match unit {
        "s" => Some(Duration::seconds(num)),
        "m" => Some(Duration::minutes(num)),
        "h" => Some(Duration::hours(num)),
        "d" => Some(Duration::days(num)),
        "w" => Some(Duration::weeks(num)),
        _ => None,
    }
}

/// Input for account registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_name: String,
    pub email: String,
    pub password: String,
    /// Defaults to `User`
    pub role: Option<UserRole>,
}

/// Input for profile edits; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

/// Session lifecycle over a [`SessionStore`]
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn SessionStore>,
    keys: Arc<dyn KeyPairProvider>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        keys: Arc<dyn KeyPairProvider>,
        config: AuthConfig,
    ) -> ApiResult<Self> {
        Ok(Self {
            store,
            keys,
            codec: TokenCodec::new(),
            hasher: PasswordHasher::new()?,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create an account
    ///
    /// Only an authenticated admin may create another admin.
    pub async fn register(
        &self,
        registration: Registration,
        caller: Option<&AuthenticatedUser>,
    ) -> ApiResult<User> {
        let email = registration.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ApiError::ValidationError("invalid email address".to_string()));
        }
        if registration.password.is_empty() {
            return Err(ApiError::ValidationError("password must not be empty".to_string()));
        }
        let user_name = registration.user_name.trim().to_string();
        if user_name.is_empty() {
            return Err(ApiError::ValidationError("user name must not be empty".to_string()));
        }

        let role = registration.role.unwrap_or_default();
        if role == UserRole::Admin && caller.map(|c| c.role) != Some(UserRole::Admin) {
            return Err(ApiError::Forbidden(
                "only admins can register admin accounts".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&registration.password).await?;
        let user = self
            .store
            .create(NewUser {
                user_name,
                email,
                password_hash,
                role,
                status: UserStatus::Active,
            })
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Verify credentials and start a new session, replacing any prior one
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<TokenPair> {
        let Some(user) = self.store.find_by_email(email).await? else {
            self.hasher.verify_dummy(password).await;
            tracing::warn!("Login failed: unknown email");
            return Err(ApiError::not_found("user", email.trim().to_lowercase()));
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login failed: password mismatch");
            return Err(ApiError::InvalidCredentials);
        }

        let (pair, binding) = self.issue_pair(&user).await?;
        if !self
            .store
            .replace_refresh_token(user.id, None, &binding)
            .await?
        {
            return Err(ApiError::not_found("user", user.id.to_string()));
        }

        tracing::info!(user_id = %user.id, replaced_session = user.has_session(), "User logged in");
        Ok(pair)
    }

    /// Rotate a refresh token into a new pair
    ///
    /// The presented token must be the user's current one, absent from the
    /// revoked trail, and signed by the key bound at issuance. A signature
    /// failure ends the session.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let claims = self
            .codec
            .decode_unverified(refresh_token)
            .map_err(|_| ApiError::invalid_request("malformed refresh token"))?;
        if claims.typ != TokenKind::Refresh {
            return Err(ApiError::invalid_request("not a refresh token"));
        }

        let user = self
            .store
            .find_by_email(&claims.payload.email)
            .await?
            .filter(|user| user.id == claims.payload.user_id)
            .ok_or_else(|| ApiError::invalid_request("no session for token"))?;

        if !user.has_session() {
            return Err(ApiError::invalid_request("no active session"));
        }
        if user.is_revoked(refresh_token) {
            tracing::warn!(user_id = %user.id, "Refresh with revoked token");
            return Err(ApiError::invalid_request("refresh token revoked"));
        }
        if user.refresh_token != refresh_token {
            tracing::warn!(user_id = %user.id, "Refresh with superseded token");
            return Err(ApiError::invalid_request("refresh token superseded"));
        }

        if self
            .codec
            .verify(refresh_token, &claims.payload.public_key)
            .is_err()
            || fingerprint(&claims.payload.public_key) != user.refresh_key_fingerprint
        {
            self.store.clear_refresh_token(user.id).await?;
            tracing::warn!(user_id = %user.id, "Refresh token failed verification, session cleared");
            return Err(ApiError::ExpiredKey);
        }

        let (pair, binding) = self.issue_pair(&user).await?;
        if !self
            .store
            .replace_refresh_token(user.id, Some(refresh_token), &binding)
            .await?
        {
            tracing::warn!(user_id = %user.id, "Concurrent refresh lost the race");
            return Err(ApiError::invalid_request("refresh token already used"));
        }

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok(pair)
    }

    /// End the user's session and revoke its refresh token
    pub async fn logout(&self, user_id: Uuid) -> ApiResult<()> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::invalid_request("user not found"))?;

        if user.has_session() {
            self.store
                .append_revoked(
                    user.id,
                    RevokedToken::logout(user.refresh_token.clone()),
                    self.config.revoked_retention,
                )
                .await?;
            self.store.clear_refresh_token(user.id).await?;
        }

        tracing::info!(user_id = %user.id, had_session = user.has_session(), "User logged out");
        Ok(())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> ApiResult<ProfileResponse> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(ProfileResponse::from)
            .ok_or_else(|| ApiError::not_found("user", user_id.to_string()))
    }

    /// Apply a partial profile edit, re-hashing the password when present
    pub async fn edit_profile(&self, user_id: Uuid, edit: ProfileEdit) -> ApiResult<ProfileResponse> {
        if let Some(email) = &edit.email {
            if !is_valid_email(email) {
                return Err(ApiError::ValidationError("invalid email address".to_string()));
            }
        }

        let user_name = match edit.user_name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ApiError::ValidationError("user name must not be empty".to_string()))
            }
            Some(name) => Some(name.to_string()),
            None => None,
        };

        let password_hash = match edit.password.as_deref() {
            Some("") => {
                return Err(ApiError::ValidationError("password must not be empty".to_string()))
            }
            Some(password) => Some(self.hasher.hash(password).await?),
            None => None,
        };

        let update = ProfileUpdate {
            user_name,
            email: edit.email,
            password_hash,
            role: edit.role,
            status: edit.status,
        };
        if update.is_empty() {
            return self.get_profile(user_id).await;
        }

        let user = self
            .store
            .update_profile(user_id, update)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id.to_string()))?;

        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(ProfileResponse::from(user))
    }

    /// Resolve a bearer access token to the calling user
    pub async fn authenticate(&self, access_token: &str) -> ApiResult<AuthenticatedUser> {
        let claims = self
            .codec
            .decode_unverified(access_token)
            .map_err(|_| ApiError::Unauthorized)?;
        if claims.typ != TokenKind::Access {
            return Err(ApiError::Unauthorized);
        }

        let user = self
            .store
            .find_by_email(&claims.payload.email)
            .await?
            .filter(|user| user.id == claims.payload.user_id && user.has_session())
            .ok_or(ApiError::Unauthorized)?;

        self.codec
            .verify(access_token, &claims.payload.public_key)
            .map_err(|_| ApiError::Unauthorized)?;
        if fingerprint(&claims.payload.public_key) != user.refresh_key_fingerprint {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }

    /// Sign a fresh pair for `user` under a newly generated key
    async fn issue_pair(&self, user: &User) -> ApiResult<(TokenPair, RefreshBinding)> {
        let keys = self.keys.generate().await?;
        let payload = TokenPayload {
            user_id: user.id,
            email: user.email.clone(),
            public_key: keys.public_key_pem.clone(),
        };

        let access_token = self.codec.sign(
            &payload,
            TokenKind::Access,
            &keys.private_key_pem,
            self.config.access_ttl,
        )?;
        let refresh_token = self.codec.sign(
            &payload,
            TokenKind::Refresh,
            &keys.private_key_pem,
            self.config.refresh_ttl,
        )?;

        let binding = RefreshBinding {
            token: refresh_token.clone(),
            key_fingerprint: fingerprint(&keys.public_key_pem),
        };
        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            binding,
        ))
    }
}

/// Simple email validation
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }

    !domain.is_empty() && domain.contains('.') && domain.split('.').all(|part| !part.is_empty())
}
