//! Session store contract and the in-memory implementation
//!
//! The token engine never touches persistence directly. Everything it needs
//! from the user record goes through [`SessionStore`]: lookups, creating a
//! user, swapping the current refresh token, and the revoked token trail.
//!
//! `replace_refresh_token` is a compare-and-swap. With `expected = Some(t)`
//! the write only lands when the stored token still equals `t`, so two
//! concurrent refreshes of the same token cannot both succeed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{NewUser, ProfileUpdate, RefreshBinding, RevokedToken, User};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Case-insensitive email lookup
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> ApiResult<Option<User>>;

    /// Insert a user; a taken email is a `Conflict`
    async fn create(&self, user: NewUser) -> ApiResult<User>;

    /// Store `binding` as the user's only session.
    ///
    /// `expected = None` replaces unconditionally (login). Returns `false`
    /// when the user is missing or the stored token no longer matches.
    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        binding: &RefreshBinding,
    ) -> ApiResult<bool>;

    /// Drop the active session, if any
    async fn clear_refresh_token(&self, id: Uuid) -> ApiResult<()>;

    /// Append to the revoked trail, pruning entries older than `retention`
    async fn append_revoked(
        &self,
        id: Uuid,
        entry: RevokedToken,
        retention: Duration,
    ) -> ApiResult<()>;

    /// Apply a partial update; `Ok(None)` when the user does not exist
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> ApiResult<Option<User>>;
}

/// Process-local store used by tests and single-node development
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> ApiResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> ApiResult<User> {
        let email = user.email.trim().to_lowercase();
        let mut users = self.users.write().await;

        if users.values().any(|existing| existing.email == email) {
            return Err(ApiError::conflict("user", email));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            user_name: user.user_name,
            email,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            refresh_token: String::new(),
            refresh_key_fingerprint: String::new(),
            revoked_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        binding: &RefreshBinding,
    ) -> ApiResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };

        if let Some(expected) = expected {
            if user.refresh_token != expected {
                return Ok(false);
            }
        }

        user.refresh_token = binding.token.clone();
        user.refresh_key_fingerprint = binding.key_fingerprint.clone();
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> ApiResult<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.refresh_token.clear();
            user.refresh_key_fingerprint.clear();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_revoked(
        &self,
        id: Uuid,
        entry: RevokedToken,
        retention: Duration,
    ) -> ApiResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("user", id.to_string()))?;

        let cutoff = Utc::now() - retention;
        user.revoked_tokens.retain(|revoked| revoked.revoked_at > cutoff);
        user.revoked_tokens.push(entry);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> ApiResult<Option<User>> {
        let mut users = self.users.write().await;

        let email = update.email.map(|email| email.trim().to_lowercase());
        if let Some(email) = &email {
            if users
                .values()
                .any(|other| other.id != id && &other.email == email)
            {
                return Err(ApiError::conflict("user", email.clone()));
            }
        }

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(user_name) = update.user_name {
            user.user_name = user_name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(password_hash) = update.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}
