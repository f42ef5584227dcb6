//! Typed error handling for bse-monitor
//!
//! Every fallible library operation returns [`AppError`], so HTTP handlers
//! can turn failures into consistent JSON bodies and callers can match on
//! the category they care about.
//!
//! # Error Categories
//!
//! - [`AppError::Config`]: missing or malformed configuration
//! - [`AppError::Storage`]: the persistence backend failed
//! - [`AppError::Upstream`]: a vendor API (Telegram, BSE, Yahoo, X, NewsAPI,
//!   Supabase, Firebase) failed or rejected the call, see [`UpstreamError`]
//! - [`AppError::Auth`]: the caller is not authenticated or not allowed
//! - [`AppError::Validation`]: bad user input
//! - [`AppError::NotFound`]: a referenced record does not exist
//!
//! # Example
//!
//! ```rust,ignore
//! match telegram.send_message(chat_id, &text).await {
//!     Ok(true) => sent += 1,
//!     Err(AppError::Config(msg)) => warn!("{msg}"),
//!     Err(AppError::Upstream(UpstreamError::RateLimited { service })) => {
//!         warn!(%service, "rate limited, skipping");
//!     }
//!     _ => {}
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// The main error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed configuration (tokens, URLs, files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors reported by third-party HTTP APIs
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Authentication / authorization failures
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Permission denied for an authenticated caller
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced record not found
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures talking to vendor APIs
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport level failure (DNS, TLS, timeout, connection reset)
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// Non-success HTTP status
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// HTTP 429 from the vendor
    #[error("{service} rate limit exceeded")]
    RateLimited { service: &'static str },

    /// The vendor answered but the payload was not what we expected
    #[error("{service} returned an unexpected payload: {message}")]
    InvalidPayload {
        service: &'static str,
        message: String,
    },

    /// The vendor reported an application level error (`ok: false`)
    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn transport(service: &'static str, err: impl std::fmt::Display) -> Self {
        UpstreamError::Transport {
            service,
            message: err.to_string(),
        }
    }

    pub fn invalid_payload(service: &'static str, err: impl std::fmt::Display) -> Self {
        UpstreamError::InvalidPayload {
            service,
            message: err.to_string(),
        }
    }

    /// Map a non-success status to the matching variant
    pub fn from_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        if status == 429 {
            UpstreamError::RateLimited { service }
        } else {
            let body: String = body.into();
            UpstreamError::Status {
                service,
                status,
                body: body.chars().take(200).collect(),
            }
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Transport { service, .. }
            | UpstreamError::Status { service, .. }
            | UpstreamError::RateLimited { service }
            | UpstreamError::InvalidPayload { service, .. }
            | UpstreamError::Api { service, .. } => service,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        AppError::Storage(err.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(UpstreamError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Upstream(UpstreamError::RateLimited { .. }) => "RATE_LIMITED",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::NotFound { entity, key } => Some(serde_json::json!({
                "entity": entity,
                "key": key,
            })),
            AppError::Upstream(e) => Some(serde_json::json!({ "service": e.service() })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.to_response())).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<tera::Error> for AppError {
    fn from(err: tera::Error) -> Self {
        AppError::Internal(format!("Template error: {}", err))
    }
}
