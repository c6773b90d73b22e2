//! Unified error handling for the gateway.
//!
//! Every failure a handler can hit is converted into the single wire shape
//! `{ "error": string, "details": ... }` with an HTTP status that matches the
//! failure class. Upstream scheduling-provider errors keep the provider's
//! own status code and body so callers retain its diagnostics.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Unified error type for action handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or missing required field
    #[error("{0}")]
    BadRequest(String),

    /// Missing/invalid caller session or webhook signature
    #[error("{0}")]
    Unauthorized(String),

    /// Caller authenticated but not permitted
    #[error("{0}")]
    Forbidden(String),

    /// Verb other than POST/OPTIONS
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Required secret or environment value missing
    #[error("{0}")]
    Config(String),

    /// Non-success response from the scheduling provider, surfaced verbatim
    #[error("Cal API error")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },

    /// Outbound request never produced a response
    #[error("Upstream request failed")]
    Request(#[from] reqwest::Error),

    /// Database connection pool error
    #[error("Database connection error")]
    ConnectionPool(#[source] diesel_async::pooled_connection::deadpool::PoolError),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Generic internal error
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Create a config error for a missing env value
    pub fn missing_env(var_name: &str) -> Self {
        ApiError::Config(format!("Missing env: {}", var_name))
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        ApiError::ConnectionPool(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
                None,
            ),
            ApiError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            ApiError::Upstream { status, body } => {
                tracing::warn!(status, "Scheduling provider returned an error");
                (
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    "Cal API error".to_string(),
                    Some(body),
                )
            }
            ApiError::Request(e) => {
                tracing::error!("Upstream request failed: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Upstream request failed".to_string(),
                    Some(serde_json::Value::String(e.to_string())),
                )
            }
            ApiError::ConnectionPool(e) => {
                tracing::error!("Connection pool error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database connection unavailable".to_string(),
                    None,
                )
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    None,
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unexpected error".to_string(),
                    Some(serde_json::Value::String(e.to_string())),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
