//! Business logic services for Tollgate
//!
//! - Token engine: register, login, refresh, logout, profile, authenticate
//! - Signing keys, token codec and password hashing underneath it
//! - Role-aware rate limiter and its policy table

pub mod auth;
pub mod keys;
pub mod password;
pub mod rate_limit;
pub mod token_codec;

pub use auth::{AuthConfig, AuthService, ProfileEdit, Registration};
pub use keys::{KeyPairProvider, RsaKeyPairProvider};
pub use password::PasswordHasher;
pub use rate_limit::{
    endpoint_key, BucketStrategy, PolicyTable, RateLimitDecision, RateLimitRequest, RateLimiter,
};
pub use token_codec::TokenCodec;
