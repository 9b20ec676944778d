//! Bearer-token extractor for protected endpoints.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::api::ApiError;
use crate::context::RequestContext;
use crate::jwt::Claims;
use crate::session::SessionService;

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Authenticated user information extracted from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    /// The audience scope the token was issued for.
    pub fn audience(&self) -> &str {
        &self.claims.aud
    }
}

/// Trait for state types that support API authentication.
pub trait HasAuthState {
    fn sessions(&self) -> &SessionService;
}

/// Extractor for API endpoints that require a valid access token.
pub struct ApiAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

        // Uniform rejection regardless of cause (bad signature, expired,
        // wrong audience, blacklisted)
        let claims = state.sessions().verify_access(token).await?;

        RequestContext::set_user(&claims.sub, &claims.username, &claims.aud);

        Ok(ApiAuth(AuthenticatedUser { claims }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_bearer_token_present() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_bearer_token_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
