//! Error types for Tutorly.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use axum::http::StatusCode;
use thiserror::Error;

/// Central error type for all Tutorly operations.
#[derive(Debug, Error)]
pub enum TutorlyError {
    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error talking to the remote API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote API answered with a non-success status.
    #[error("Upstream error ({status}): {body}")]
    Upstream {
        /// HTTP status returned by the backend.
        status: u16,
        /// Raw response body, truncated.
        body: String,
    },

    /// Response body matched none of the accepted shapes.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The session provider call failed or returned malformed data.
    #[error("Session resolution error: {0}")]
    SessionResolution(String),

    /// No valid session credential on the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Authenticated, but the role may not perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl TutorlyError {
    /// Log error with full context using tracing.
    pub fn log_with_context(&self, context: &ErrorContext) {
        match self {
            Self::Http(_) | Self::Upstream { .. } | Self::Decode(_) | Self::Json(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    user_id = ?context.user_id,
                    operation = %context.operation,
                    "Remote API error"
                );
            }
            Self::SessionResolution(_) => {
                tracing::warn!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Session provider unavailable"
                );
            }
            Self::Unauthenticated
            | Self::Forbidden(_)
            | Self::NotFound(_)
            | Self::InvalidInput(_) => {
                tracing::info!(
                    error = %self,
                    request_id = %context.request_id,
                    user_id = ?context.user_id,
                    operation = %context.operation,
                    "Request rejected"
                );
            }
            Self::Config(_) | Self::Io(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Configuration error"
                );
            }
        }
    }

    /// HTTP status used when this error reaches a handler boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } if *status == 404 => StatusCode::NOT_FOUND,
            Self::Http(_)
            | Self::Upstream { .. }
            | Self::Decode(_)
            | Self::Json(_)
            | Self::SessionResolution(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get user-friendly error message (hides internal details)
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "Service configuration error",
            Self::Http(_) => "Network error, please try again",
            Self::Json(_) | Self::Decode(_) => "Unexpected response from booking service",
            Self::Upstream { .. } => "Booking service rejected the request",
            Self::SessionResolution(_) => "Authentication service temporarily unavailable",
            Self::Unauthenticated => "Please log in to continue",
            Self::Forbidden(_) => "You do not have access to this resource",
            Self::NotFound(_) => "Not found",
            Self::InvalidInput(_) => "Invalid request",
            Self::Io(_) => "File system error",
        }
    }
}

/// Context information for error logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// User ID if available
    pub user_id: Option<String>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
        }
    }

    /// Set user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for Tutorly operations.
pub type Result<T> = std::result::Result<T, TutorlyError>;
