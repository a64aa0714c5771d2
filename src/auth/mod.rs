//! Authentication conventions for the two API namespaces
//!
//! Requests under `/api/v1/` authenticate with HTTP basic auth where the
//! username is the account email and the password its API key. Requests
//! under `/json/` ride on the browser session cookie.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use cookie::Cookie;
use serde::Serialize;
use thiserror::Error;

pub mod provider;

pub use provider::StaticAuthenticator;

/// Authentication errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header for basic auth")]
    MissingAuthorization,

    #[error("Only Basic authentication is supported.")]
    UnsupportedScheme,

    #[error("Invalid authorization header for basic auth")]
    MalformedCredentials,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Account not active")]
    AccountNotActive,

    #[error("Not logged in: API authentication or user session required")]
    NotLoggedIn,
}

/// Which convention authenticated a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    ApiKey,
    Session,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::ApiKey => "api_key",
            AuthScheme::Session => "session",
        }
    }
}

/// The account a request was authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub email: String,
    pub full_name: String,
    pub is_bot: bool,
}

/// Credential lookup used by the REST dispatcher
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate an `email:api_key` pair from basic auth
    async fn validate_api_key(&self, email: &str, api_key: &str)
    -> Result<UserProfile, AuthError>;

    /// Look up the user behind a session key, if the session is live
    async fn session_user(&self, session_key: &str) -> Option<UserProfile>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Decode `Authorization: Basic base64(email:api_key)`
pub fn parse_basic_auth(headers: &HeaderMap) -> Result<(String, String), AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredentials)?;

    let (scheme, encoded) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedCredentials)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::UnsupportedScheme);
    }

    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|_| AuthError::MalformedCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;

    // Split on the first ':' only
    let (email, api_key) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedCredentials)?;

    Ok((email.to_string(), api_key.to_string()))
}

/// Read the session key from the `Cookie` header
pub fn session_key(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value_trimmed().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_basic_auth() {
        let encoded = BASE64.encode("iago@example.com:abcd1234");
        let headers = headers_with(header::AUTHORIZATION, &format!("Basic {}", encoded));

        let (email, key) = parse_basic_auth(&headers).unwrap();
        assert_eq!(email, "iago@example.com");
        assert_eq!(key, "abcd1234");
    }

    #[test]
    fn test_parse_basic_auth_missing_header() {
        assert_eq!(
            parse_basic_auth(&HeaderMap::new()),
            Err(AuthError::MissingAuthorization)
        );
    }

    #[test]
    fn test_parse_basic_auth_rejects_other_schemes() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer sometoken");
        assert_eq!(
            parse_basic_auth(&headers),
            Err(AuthError::UnsupportedScheme)
        );
    }

    #[test]
    fn test_parse_basic_auth_rejects_garbage() {
        let headers = headers_with(header::AUTHORIZATION, "Basic !!!not-base64!!!");
        assert_eq!(
            parse_basic_auth(&headers),
            Err(AuthError::MalformedCredentials)
        );

        let no_colon = BASE64.encode("justanemail");
        let headers = headers_with(header::AUTHORIZATION, &format!("Basic {}", no_colon));
        assert_eq!(
            parse_basic_auth(&headers),
            Err(AuthError::MalformedCredentials)
        );
    }

    #[test]
    fn test_session_key_from_cookie() {
        let headers = headers_with(header::COOKIE, "csrftoken=xyz; sessionid=s3cr3t; theme=dark");
        assert_eq!(
            session_key(&headers, "sessionid"),
            Some("s3cr3t".to_string())
        );
        assert_eq!(session_key(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_session_cookie_is_ignored() {
        let headers = headers_with(header::COOKIE, "sessionid=");
        assert_eq!(session_key(&headers, "sessionid"), None);
    }

    #[test]
    fn test_session_cookie_is_percent_decoded() {
        let headers = headers_with(header::COOKIE, "sessionid=abc%3D%3D; other=1");
        assert_eq!(session_key(&headers, "sessionid"), Some("abc==".to_string()));

        let headers = headers_with(header::COOKIE, "sessionid=\"quoted\"");
        assert_eq!(session_key(&headers, "sessionid"), Some("quoted".to_string()));
    }

    #[test]
    fn test_session_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(header::COOKIE, HeaderValue::from_static("sessionid=second"));
        assert_eq!(session_key(&headers, "sessionid"), Some("second".to_string()));
    }
}
