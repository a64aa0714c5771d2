//! Error types for routing-table construction and API responses

use crate::auth::AuthError;
use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while compiling or reversing the routing table
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid URL pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid route '{pattern}': {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("Pattern '{pattern}' cannot be reversed: {reason}")]
    NotReversible { pattern: String, reason: String },

    #[error("Reverse for '{name}' not found with the given arguments")]
    NoReverseMatch { name: String },

    #[error("Unknown language '{0}'")]
    UnknownLanguage(String),
}

pub type RouteResult<T> = Result<T, RouteError>;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("View '{0}' is not implemented")]
    NotImplemented(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let msg = match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                result: "error",
                msg,
            }),
        )
            .into_response();

        match self {
            ApiError::MethodNotAllowed { allowed } => {
                if let Ok(value) = HeaderValue::from_str(&allow_header(&allowed)) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
            }
            ApiError::Unauthorized(_) => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Basic realm="chat""#),
                );
            }
            _ => {}
        }

        response
    }
}

/// Render a method list the way the `Allow` header expects it
pub fn allow_header(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Serialize)]
struct ErrorResponse {
    result: &'static str,
    msg: String,
}
