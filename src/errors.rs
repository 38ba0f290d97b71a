//! Error taxonomy for the gateway and its rendering into the uniform client envelope.
//!
//! Every failure a handler can produce ends up as a [`GatewayError`], which renders as
//! `{ "error": ..., "code": ... }` with the matching status code. Upstream failures are
//! described by [`UpstreamError`] and translated at the client boundary, so raw provider
//! bodies never reach the caller.
use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

use crate::quiz::QuizParseError;

/// Failures from an upstream provider call.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The credential for this provider was never configured; no call was attempted.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} did not respond within {timeout:?}")]
    Timeout {
        service: &'static str,
        timeout: Duration,
    },

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("{service} is unreachable: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: StatusCode,
        message: String,
    },

    /// The provider answered, but not with anything usable.
    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    QuizParse(#[from] QuizParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Too many requests, please wait and try again.")]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Not Found")]
    NotFound,

    #[error("An internal server error occurred.")]
    Internal(String),
}

/// Machine-readable error kind carried in the envelope's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    RateLimitExceeded,
    UpstreamError,
    UpstreamTimeout,
    UpstreamParseError,
    NotFound,
    InternalError,
}

/// The body of every non-2xx response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl GatewayError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::Upstream(UpstreamError::Timeout { .. }) => ErrorCode::UpstreamTimeout,
            Self::Upstream(UpstreamError::QuizParse(_)) => ErrorCode::UpstreamParseError,
            Self::Upstream(_) => ErrorCode::UpstreamError,
            Self::NotFound => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whole seconds until a rate-limited client may retry, never less than one.
    fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after: Some(wait),
            } => Some(wait.as_secs_f64().ceil().max(1.0) as u64),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.to_string(),
            code: self.code(),
            retry_after_seconds: self.retry_after_seconds(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(detail) => error!(detail = %detail, "Internal error"),
            Self::Upstream(e) => warn!(error = %e, "Upstream call failed"),
            _ => {}
        }

        let status = self.status();
        let envelope = self.envelope();
        let mut response = (status, Json(&envelope)).into_response();
        if let Some(seconds) = envelope.retry_after_seconds {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON body with Content-Type: application/json".to_string()
            }
            JsonRejection::JsonSyntaxError(_) => "Invalid JSON input.".to_string(),
            other => format!("Invalid JSON input: {}", other.body_text()),
        };
        Self::InvalidInput(message)
    }
}

impl From<MultipartError> for GatewayError {
    fn from(e: MultipartError) -> Self {
        Self::InvalidInput(format!("Invalid multipart payload: {}", e.body_text()))
    }
}

impl From<MultipartRejection> for GatewayError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::InvalidInput(format!(
            "Expected a multipart/form-data audio upload: {}",
            rejection.body_text()
        ))
    }
}

/// Renders a caught handler panic with the same envelope as every other failure.
pub fn panic_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    GatewayError::Internal("handler panicked".into()).into_response()
}
