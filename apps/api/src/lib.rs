//! Tollgate API library
//!
//! Session authentication with per-login RSA keys, rotating refresh
//! tokens and role-aware rate limiting. Exposed as a library for the
//! server binary and integration tests.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::{app_router, AppState};
pub use services::{AuthConfig, AuthService};
