//! Caller identity and access control
//!
//! - `resolve_identity`: optional bearer authentication, stores a
//!   [`RequestIdentity`] in the request extensions
//! - `enforce_access`: applies the route table to that identity
//! - `AuthUser` / `MaybeAuthUser`: handler extractors over the identity
//!
//! Identity runs before the rate limiter so limits see the caller's role;
//! access control runs after it so rejected callers still count.

use std::net::SocketAddr;

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::middleware::rate_limit::extract_client_ip;
use crate::models::{AuthenticatedUser, UserRole};
use crate::routes::AppState;

/// Who is calling, as far as the request can tell
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Set when a valid access token was presented
    pub user: Option<AuthenticatedUser>,
    pub client_ip: String,
}

impl RequestIdentity {
    pub fn anonymous(client_ip: impl Into<String>) -> Self {
        Self {
            user: None,
            client_ip: client_ip.into(),
        }
    }

    /// Anonymous callers are limited as `User`
    pub fn role(&self) -> UserRole {
        self.user.as_ref().map(|user| user.role).unwrap_or_default()
    }

    /// User id when authenticated, else the client address
    pub fn identifier(&self) -> String {
        match &self.user {
            Some(user) => user.user_id.to_string(),
            None => self.client_ip.clone(),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Route path used for policy lookups: the matched pattern when known
pub(crate) fn route_path(request: &Request<Body>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path())
}

/// Resolve the caller and store a [`RequestIdentity`]
///
/// A bad or stale token leaves the caller anonymous; routes that need a
/// user are rejected later by `enforce_access`. Store faults are returned.
pub async fn resolve_identity(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(
        request.headers(),
        connect_info.as_ref(),
        &state.trusted_proxies,
    );
    let mut identity = RequestIdentity::anonymous(client_ip);

    let token = extract_bearer_token(request.headers()).map(str::to_owned);
    if let Some(token) = token {
        match state.auth.authenticate(&token).await {
            Ok(user) => identity.user = Some(user),
            Err(ApiError::Unauthorized) => {
                tracing::debug!(ip = %identity.client_ip, "Bearer token rejected");
            }
            Err(e) => return e.into_response(),
        }
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Apply the route table to the resolved identity
pub async fn enforce_access(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let user = request
        .extensions()
        .get::<RequestIdentity>()
        .and_then(|identity| identity.user.as_ref());

    if let Err(e) = state
        .routes
        .authorize(request.method(), route_path(&request), user)
    {
        return e.into_response();
    }

    next.run(request).await
}

/// Authenticated caller; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

/// Caller if authenticated
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .and_then(|identity| identity.user.clone())
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            parts
                .extensions
                .get::<RequestIdentity>()
                .and_then(|identity| identity.user.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        assert_eq!(
            extract_bearer_token(&headers("Bearer test_token_123")),
            Some("test_token_123")
        );
        assert_eq!(
            extract_bearer_token(&headers("bearer test_token_123")),
            Some("test_token_123")
        );
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
        assert_eq!(extract_bearer_token(&headers("Bearer ")), None);
    }

    #[test]
    fn test_extract_bearer_token_invalid_scheme() {
        assert_eq!(extract_bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
    }

    #[test]
    fn test_identity_defaults() {
        let anonymous = RequestIdentity::anonymous("203.0.113.1");
        assert_eq!(anonymous.role(), UserRole::User);
        assert_eq!(anonymous.identifier(), "203.0.113.1");

        let user_id = Uuid::new_v4();
        let admin = RequestIdentity {
            user: Some(AuthenticatedUser {
                user_id,
                email: "a@x.com".to_string(),
                role: UserRole::Admin,
            }),
            client_ip: "203.0.113.1".to_string(),
        };
        assert_eq!(admin.role(), UserRole::Admin);
        assert_eq!(admin.identifier(), user_id.to_string());
    }

    #[tokio::test]
    async fn test_auth_user_rejects_anonymous() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(RequestIdentity::anonymous("203.0.113.1"));
        let (mut parts, _) = request.into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));

        let maybe = MaybeAuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(maybe.0.is_none());
    }
}
