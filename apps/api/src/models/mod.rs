//! Domain models for Tollgate
//!
//! - Users, sessions and the revoked token trail
//! - Token payloads, claims and key pairs
//! - Rate limit tiers and response metadata

pub mod rate_limit;
pub mod token;
pub mod user;

pub use rate_limit::{RateLimitMetadata, RateLimitRejection, RateLimitTier};
pub use token::{KeyPair, TokenClaims, TokenKind, TokenPair, TokenPayload};
pub use user::{
    AuthenticatedUser, NewUser, ProfileResponse, ProfileUpdate, RefreshBinding, RevokedToken,
    User, UserRole, UserStatus,
};
