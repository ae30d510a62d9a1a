//! Argon2id password hashing
//!
//! Hashing and verification are CPU-bound and run on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{ApiError, ApiResult};

/// Argon2id hasher producing PHC strings
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Verified against when a login email is unknown, so a missing user
    /// costs the same as a wrong password.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new() -> ApiResult<Self> {
        let argon2 = Argon2::default();
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"tollgate-dummy-password", &salt)
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(Self { argon2, dummy_hash })
    }

    /// Hash a plaintext password
    pub async fn hash(&self, password: &str) -> ApiResult<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
        })
        .await?
    }

    /// Compare a plaintext password against a stored PHC hash
    pub async fn verify(&self, password: &str, hash: &str) -> ApiResult<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| ApiError::Internal(format!("Invalid password hash format: {}", e)))?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await?
    }

    /// Burn one verification against the dummy hash
    pub async fn verify_dummy(&self, password: &str) {
        let dummy = self.dummy_hash.clone();
        let _ = self.verify(password, &dummy).await;
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}
