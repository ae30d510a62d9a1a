//! PostgreSQL session store
//!
//! One row per user in `users`; the active session lives in the
//! `refresh_token`/`refresh_key_fingerprint` columns and the revoked trail
//! in a JSONB array. The compare-and-swap and the pruning append are both
//! single UPDATE statements, so Postgres row locking serializes writers.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{NewUser, ProfileUpdate, RefreshBinding, RevokedToken, User};

use super::session::SessionStore;

const USER_COLUMNS: &str = r#"
    id,
    user_name,
    email,
    password_hash,
    role,
    status,
    refresh_token,
    refresh_key_fingerprint,
    revoked_tokens,
    created_at,
    updated_at
"#;

/// Session store backed by the `users` table
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique violation on `email` to `Conflict`
fn map_email_conflict(err: sqlx::Error, email: &str) -> ApiError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::conflict("user", email)
        }
        other => ApiError::Database(other),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: Uuid) -> ApiResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, user: NewUser) -> ApiResult<User> {
        let email = user.email.trim().to_lowercase();
        let query = format!(
            r#"
            INSERT INTO users (user_name, email, password_hash, role, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(&user.user_name)
            .bind(&email)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(user.status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_email_conflict(e, &email))
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        binding: &RefreshBinding,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $2,
                refresh_key_fingerprint = $3,
                updated_at = NOW()
            WHERE id = $1
              AND ($4::text IS NULL OR refresh_token = $4)
            "#,
        )
        .bind(id)
        .bind(&binding.token)
        .bind(&binding.key_fingerprint)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = '',
                refresh_key_fingerprint = '',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_revoked(
        &self,
        id: Uuid,
        entry: RevokedToken,
        retention: Duration,
    ) -> ApiResult<()> {
        let cutoff = Utc::now() - retention;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET revoked_tokens = COALESCE(
                    (
                        SELECT jsonb_agg(e)
                        FROM jsonb_array_elements(revoked_tokens) AS e
                        WHERE (e->>'revokedAt')::timestamptz > $3
                    ),
                    '[]'::jsonb
                ) || jsonb_build_array($2::jsonb),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&entry))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user", id.to_string()));
        }
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> ApiResult<Option<User>> {
        let email = update.email.map(|email| email.trim().to_lowercase());
        let query = format!(
            r#"
            UPDATE users
            SET user_name = COALESCE($2, user_name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                status = COALESCE($6, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(update.user_name)
            .bind(&email)
            .bind(update.password_hash)
            .bind(update.role)
            .bind(update.status)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_email_conflict(e, email.as_deref().unwrap_or_default()))
    }
}
