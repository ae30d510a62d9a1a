//! HTTP routes for the Tollgate API
//!
//! - `auth`: the `/api/auth` handlers
//! - `table`: route access rules consulted by the access-control layer

pub mod auth;
pub mod table;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::middleware::{enforce_access, rate_limit, resolve_identity, TrustedProxies};
use crate::services::{AuthService, RateLimiter};

pub use table::{RouteAccess, RouteTable};

/// Shared state for handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub limiter: RateLimiter,
    pub routes: Arc<RouteTable>,
    /// Peers whose forwarding headers name the client
    pub trusted_proxies: Arc<TrustedProxies>,
}

impl AppState {
    pub fn new(auth: AuthService, limiter: RateLimiter, routes: RouteTable) -> Self {
        Self {
            auth: Arc::new(auth),
            limiter,
            routes: Arc::new(routes),
            trusted_proxies: Arc::new(TrustedProxies::default()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.trusted_proxies = Arc::new(proxies);
        self
    }
}

/// Build the API router
///
/// Route layers run outermost-last: identity, then rate limit, then access.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/auth/profile",
            get(auth::get_profile).put(auth::edit_profile),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_access,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_identity,
        ))
        .with_state(state)
}
