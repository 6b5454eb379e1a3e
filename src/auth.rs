//! API key authentication (§4.J), grounded in the original service's
//! `middleware/api_key_auth.py`: pull the key from `X-API-Key` first,
//! then a `Bearer` `Authorization` header; never reveal whether a key
//! existed, only whether the request is authorized.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::application::Application;
use crate::error::AuthError;
use crate::models::Tenant;

const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub enum CurrentTenant {
    Admin,
    Tenant(Tenant),
}

impl CurrentTenant {
    pub fn slug(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Tenant(tenant) => &tenant.slug,
        }
    }

    pub fn require_tenant(&self) -> Result<&Tenant, AuthError> {
        match self {
            Self::Tenant(tenant) => Ok(tenant),
            Self::Admin => Err(AuthError::Forbidden),
        }
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key") {
        return value.to_str().ok().map(str::to_owned);
    }
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let raw = value.to_str().ok()?;
        return raw.strip_prefix("Bearer ").map(str::to_owned);
    }
    None
}

fn is_public_endpoint(path: &str) -> bool {
    path == HEALTH_PATH
}

/// Axum middleware installed ahead of every `/api` route. Resolves the
/// caller's tenant and stores it as a request extension; handlers pull it
/// back out with the `CurrentTenant` extractor.
pub async fn require_api_key<B: Send>(
    State(app): State<Application>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, AuthError> {
    if is_public_endpoint(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(request.headers()).ok_or(AuthError::Missing)?;

    let tenant = if constant_time_eq(&api_key, &app.config.admin_api_key) {
        CurrentTenant::Admin
    } else {
        app.catalog
            .tenant_by_api_key(&api_key)
            .await
            .map_err(|_| AuthError::Invalid)?
            .map(CurrentTenant::Tenant)
            .ok_or(AuthError::Invalid)?
    };

    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentTenant>().cloned().ok_or(AuthError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_api_key_from_x_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        assert_eq!(extract_api_key(&headers), Some("secret".to_owned()));
    }

    #[test]
    fn extracts_api_key_from_bearer_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(extract_api_key(&headers), Some("secret".to_owned()));
    }

    #[test]
    fn missing_headers_yield_no_key() {
        assert_eq!(extract_api_key(&HeaderMap::new()), None);
    }

    #[test]
    fn health_is_the_only_public_endpoint() {
        assert!(is_public_endpoint("/health"));
        assert!(!is_public_endpoint("/api/query"));
    }

    #[test]
    fn admin_key_compares_in_constant_time() {
        assert!(constant_time_eq("changeme", "changeme"));
        assert!(!constant_time_eq("changeme", "wrong"));
    }
}
