//! Test fixtures: key pool, services and seeded users

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use tollgate_api::models::{KeyPair, User, UserRole};
use tollgate_api::repositories::{InMemoryCounterStore, InMemorySessionStore, SessionStore};
use tollgate_api::routes::{AppState, RouteTable};
use tollgate_api::services::keys::{generate_rsa_key_pair, MIN_KEY_BITS};
use tollgate_api::services::{
    AuthConfig, AuthService, BucketStrategy, KeyPairProvider, PolicyTable, RateLimiter,
    Registration,
};
use tollgate_api::ApiResult;

pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Keys generated once per test binary
static KEY_POOL: Lazy<Vec<KeyPair>> = Lazy::new(|| {
    (0..6)
        .map(|_| generate_rsa_key_pair(MIN_KEY_BITS).expect("test key generation"))
        .collect()
});

/// Hands out pool keys round-robin, starting fresh per provider
#[derive(Debug, Default)]
pub struct PooledKeyProvider {
    next: AtomicUsize,
}

#[async_trait]
impl KeyPairProvider for PooledKeyProvider {
    async fn generate(&self) -> ApiResult<KeyPair> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % KEY_POOL.len();
        Ok(KEY_POOL[index].clone())
    }
}

/// Service plus a handle on its store for direct inspection
pub struct TestAuth {
    pub service: AuthService,
    pub store: Arc<InMemorySessionStore>,
}

impl TestAuth {
    pub fn new() -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        let service = AuthService::new(
            store.clone(),
            Arc::new(PooledKeyProvider::default()),
            AuthConfig::default(),
        )
        .expect("auth service");
        Self { service, store }
    }

    pub async fn register(&self, email: &str, role: UserRole) -> User {
        let admin = self.admin_caller();
        self.service
            .register(
                Registration {
                    user_name: email.split('@').next().unwrap_or("user").to_string(),
                    email: email.to_string(),
                    password: TEST_PASSWORD.to_string(),
                    role: Some(role),
                },
                admin.as_ref(),
            )
            .await
            .expect("register")
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .find_by_email(email)
            .await
            .expect("store lookup")
            .expect("user exists")
    }

    fn admin_caller(&self) -> Option<tollgate_api::models::AuthenticatedUser> {
        Some(tollgate_api::models::AuthenticatedUser {
            user_id: uuid::Uuid::new_v4(),
            email: "root@example.com".to_string(),
            role: UserRole::Admin,
        })
    }
}

/// Router state over in-memory stores and the default tables
///
/// Uses per-window buckets so a minute boundary cannot split a test run.
pub fn test_state(auth: &TestAuth) -> AppState {
    let limiter = RateLimiter::new(
        PolicyTable::default_auth(),
        Arc::new(InMemoryCounterStore::new()),
        BucketStrategy::TierWindow,
    );
    AppState::new(auth.service.clone(), limiter, RouteTable::default_auth())
}
