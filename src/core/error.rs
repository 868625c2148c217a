//! # Error Handling
//!
//! Boundary error type for the gateway. Every failure that can reach a client
//! is expressed as a [`GatewayError`] variant, and each variant knows its HTTP
//! status code and a stable `type` string for the JSON error body.
//!
//! The admission layer never hands raw upstream errors to the caller. They are
//! mapped here into one of four kinds:
//! - `RequestValidation`: missing or malformed input, answered before any cache
//!   or upstream interaction
//! - `RateLimited`: the upstream identity's window is exhausted
//! - `UpstreamFailure`: network, status, decode or timeout failure upstream;
//!   the cause is logged and never rendered
//! - `Configuration` / `Internal`: startup and unexpected failures

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::gateway::admission::AdmissionError;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Message returned to clients for any upstream failure.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to fetch data from upstream";

/// Error types for the gateway
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, unreadable files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Request validation errors (missing query, unknown language, bad URL)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// The upstream identity has used its quota for the current window
    #[error("Rate limit exceeded for {identity}, retry after {retry_after_secs}s")]
    RateLimited {
        identity: String,
        retry_after_secs: u64,
    },

    /// The upstream call failed. `cause` is kept for logs only.
    #[error("Upstream failure ({identity}): {cause}")]
    UpstreamFailure { identity: String, cause: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error for a named input field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::UpstreamFailure { .. })
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "validation_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Message safe to show to a client. Upstream and internal causes stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::RequestValidation { .. } | Self::RateLimited { .. } => self.to_string(),
            Self::UpstreamFailure { .. } => UPSTREAM_FAILURE_MESSAGE.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<AdmissionError> for GatewayError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited {
                identity,
                retry_after_secs,
            } => Self::RateLimited {
                identity: identity.to_string(),
                retry_after_secs,
            },
            AdmissionError::Upstream { identity, source } => Self::UpstreamFailure {
                identity: identity.to_string(),
                cause: source.to_string(),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.public_message(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        let retry_after = match &self {
            Self::RateLimited {
                retry_after_secs, ..
            } => {
                body["error"]["retry_after_seconds"] = json!(retry_after_secs);
                Some(*retry_after_secs)
            }
            _ => None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
