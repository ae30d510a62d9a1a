//! Route access table
//!
//! Which callers may reach which route, registered once at startup. The
//! access-control middleware consults it after the rate limiter has run.

use axum::http::Method;

use crate::error::{ApiError, ApiResult};
use crate::models::{AuthenticatedUser, UserRole};
use crate::services::endpoint_key;

/// Who may call a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    /// Authenticated with one of these roles
    Roles(Vec<UserRole>),
}

#[derive(Debug, Clone)]
struct RouteEntry {
    endpoint: String,
    access: RouteAccess,
}

/// Explicit route registrations, keyed like rate limit endpoints
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access rules for the `/api/auth` routes
    pub fn default_auth() -> Self {
        Self::new()
            .register(Method::POST, "/api/auth/register", RouteAccess::Public)
            .register(Method::POST, "/api/auth/login", RouteAccess::Public)
            .register(Method::POST, "/api/auth/refresh", RouteAccess::Public)
            .register(Method::POST, "/api/auth/logout", RouteAccess::Authenticated)
            .register(Method::GET, "/api/auth/profile", RouteAccess::Authenticated)
            .register(
                Method::PUT,
                "/api/auth/profile",
                RouteAccess::Roles(vec![UserRole::Admin]),
            )
    }

    /// Add or replace the rule for `method path`
    pub fn register(mut self, method: Method, path: &str, access: RouteAccess) -> Self {
        let endpoint = endpoint_key(method.as_str(), path);
        self.entries.retain(|entry| entry.endpoint != endpoint);
        self.entries.push(RouteEntry { endpoint, access });
        self
    }

    pub fn access(&self, method: &Method, path: &str) -> Option<&RouteAccess> {
        let endpoint = endpoint_key(method.as_str(), path);
        self.entries
            .iter()
            .find(|entry| entry.endpoint == endpoint)
            .map(|entry| &entry.access)
    }

    /// Check `user` against the rule for `method path`
    ///
    /// Unregistered routes are left to the router (404/405).
    pub fn authorize(
        &self,
        method: &Method,
        path: &str,
        user: Option<&AuthenticatedUser>,
    ) -> ApiResult<()> {
        match self.access(method, path) {
            None | Some(RouteAccess::Public) => Ok(()),
            Some(RouteAccess::Authenticated) => user.map(|_| ()).ok_or(ApiError::Unauthorized),
            Some(RouteAccess::Roles(roles)) => {
                let user = user.ok_or(ApiError::Unauthorized)?;
                if roles.contains(&user.role) {
                    Ok(())
                } else {
                    Err(ApiError::Forbidden(format!(
                        "role '{}' may not call {}",
                        user.role,
                        endpoint_key(method.as_str(), path)
                    )))
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
