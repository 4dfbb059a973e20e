//! Request identity resolution.
//!
//! A caller is either an authenticated Supabase user (bearer token resolved
//! to a user id) or an anonymous client known only by its best-effort
//! network address.

use crate::config::SupabaseConfig;
use crate::http::{create_client_with_timeout, DETECTION_TIMEOUT};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

/// Address used when no forwarding header is present.
pub const UNKNOWN_ADDRESS: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Authenticated principal, keyed by user id.
    User(String),
    /// Unauthenticated caller, keyed by client address.
    Anonymous(String),
}

impl Identity {
    /// Counter key for this identity.
    pub fn key(&self) -> &str {
        match self {
            Self::User(id) => id,
            Self::Anonymous(addr) => addr,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// Best-effort client address from proxy headers.
pub fn client_address(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string()
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone)]
pub struct AuthError(pub String);

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Auth error: {}", self.0)
    }
}

impl std::error::Error for AuthError {}

/// Resolves a bearer token to a user id.
///
/// `Ok(None)` means the token is not valid; `Err` means the provider could
/// not be asked.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn user_id(&self, token: &str) -> Result<Option<String>, AuthError>;
}

/// Treats every caller as anonymous.
#[derive(Debug, Clone, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn user_id(&self, _token: &str) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

/// Supabase GoTrue token lookup (`GET /auth/v1/user`).
#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    user_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct SupabaseUser {
    id: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: create_client_with_timeout(DETECTION_TIMEOUT),
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    /// `None` unless both the project URL and anon key are configured.
    pub fn from_config(config: &SupabaseConfig) -> Option<Self> {
        match (&config.url, &config.anon_key) {
            (Some(url), Some(key)) => Some(Self::new(url, key)),
            _ => None,
        }
    }
}

#[async_trait]
impl Authenticator for SupabaseAuth {
    async fn user_id(&self, token: &str) -> Result<Option<String>, AuthError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError(format!("Request failed: {}", e)))?;

        match response.status() {
            s if s.is_success() => {
                let user: SupabaseUser = response
                    .json()
                    .await
                    .map_err(|e| AuthError(format!("Invalid user payload: {}", e)))?;
                Ok(Some(user.id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s => Err(AuthError(format!("Unexpected status {}", s))),
        }
    }
}

/// Work out who is calling.
///
/// Any auth failure degrades to the anonymous identity.
pub async fn resolve(headers: &HeaderMap, auth: &dyn Authenticator) -> Identity {
    if let Some(token) = bearer_token(headers) {
        match auth.user_id(token).await {
            Ok(Some(id)) => return Identity::User(id),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Token lookup failed, treating caller as anonymous"),
        }
    }
    Identity::Anonymous(client_address(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    struct StaticAuth(Result<Option<String>, AuthError>);

    #[async_trait]
    impl Authenticator for StaticAuth {
        async fn user_id(&self, _token: &str) -> Result<Option<String>, AuthError> {
            self.0.clone()
        }
    }

    #[test]
    fn client_address_prefers_first_forwarded_entry() {
        let h = headers(&[
            ("x-forwarded-for", " 198.51.100.7 , 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
        ]);
        assert_eq!(client_address(&h), "198.51.100.7");
    }

    #[test]
    fn client_address_falls_back_to_real_ip() {
        let h = headers(&[("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_address(&h), "10.0.0.2");
    }

    #[test]
    fn client_address_defaults_to_unknown() {
        assert_eq!(client_address(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn bearer_token_requires_scheme() {
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer abc")])), Some("abc"));
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer ")])), None);
    }

    #[tokio::test]
    async fn resolve_returns_user_for_valid_token() {
        let h = headers(&[("authorization", "Bearer tok"), ("x-real-ip", "10.0.0.2")]);
        let identity = resolve(&h, &StaticAuth(Ok(Some("user-9".to_string())))).await;
        assert_eq!(identity, Identity::User("user-9".to_string()));
        assert!(identity.is_authenticated());
    }

    #[tokio::test]
    async fn resolve_degrades_to_anonymous_on_auth_error() {
        let h = headers(&[("authorization", "Bearer tok"), ("x-real-ip", "10.0.0.2")]);
        let identity = resolve(&h, &StaticAuth(Err(AuthError("down".to_string())))).await;
        assert_eq!(identity, Identity::Anonymous("10.0.0.2".to_string()));
    }

    #[tokio::test]
    async fn resolve_without_token_is_anonymous() {
        let identity = resolve(&HeaderMap::new(), &NoAuth).await;
        assert_eq!(identity.key(), "unknown");
    }

    #[tokio::test]
    async fn supabase_auth_returns_user_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer good-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "5f1c", "email": "learner@example.com"}"#)
            .create_async()
            .await;

        let auth = SupabaseAuth::new(&server.url(), "anon");
        let id = auth.user_id("good-token").await.unwrap();

        mock.assert_async().await;
        assert_eq!(id, Some("5f1c".to_string()));
    }

    #[tokio::test]
    async fn supabase_auth_rejected_token_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .create_async()
            .await;

        let auth = SupabaseAuth::new(&server.url(), "anon");
        assert_eq!(auth.user_id("expired").await.unwrap(), None);
    }
}
