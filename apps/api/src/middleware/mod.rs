//! Middleware components for Tollgate
//!
//! Applied per route in this order:
//! - `resolve_identity`: optional bearer authentication and client address
//! - `rate_limit`: role-aware limits with `X-RateLimit-*` headers
//! - `enforce_access`: route table check (401/403)
//!
//! Handlers read the caller through the `AuthUser` and `MaybeAuthUser`
//! extractors.

pub mod auth;
pub mod rate_limit;

pub use auth::{enforce_access, resolve_identity, AuthUser, MaybeAuthUser, RequestIdentity};
pub use rate_limit::{
    apply_headers, exposed_headers, extract_client_ip, rate_limit, TrustedProxies,
};
