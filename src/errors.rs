use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unique error codes for client identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationFailed = 1001,

    // Authentication errors (2xxx)
    Unauthenticated = 2001,

    // Authorization errors (3xxx)
    Forbidden = 3001,

    // Resource errors (4xxx)
    NotFound = 4001,

    // Conflict errors (5xxx)
    Conflict = 5001,

    // Upstream errors (6xxx)
    UpstreamFailed = 6001,
    UpstreamRateLimited = 6002,
    UpstreamTimeout = 6003,

    // Store errors (7xxx)
    StoreConflict = 7001,

    // Internal errors (9xxx)
    InternalError = 9001,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Application error kinds with HTTP mappings.
///
/// Variants carry only owned strings and scalars so the enum stays `Clone`
/// and results can ride in shared in-flight futures.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Upstream request failed: {message}")]
    UpstreamTransient { message: String },

    #[error("Upstream rate limited, try again later")]
    UpstreamRateLimited { retry_after_secs: Option<u64> },

    #[error("Upstream request timed out after {timeout_secs}s")]
    UpstreamTimeout { timeout_secs: u64 },

    #[error("Concurrent update conflict for user {user_id}")]
    StoreConflict { user_id: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::UpstreamTransient { .. } => ErrorCode::UpstreamFailed,
            Self::UpstreamRateLimited { .. } => ErrorCode::UpstreamRateLimited,
            Self::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            Self::StoreConflict { .. } => ErrorCode::StoreConflict,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::UpstreamTransient { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::StoreConflict { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::UpstreamTimeout { timeout_secs: 15 };
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return AppError::UpstreamRateLimited {
                    retry_after_secs: None,
                };
            }
        }
        AppError::UpstreamTransient {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal {
            message: format!("serialization error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // 500s get a correlation id in place of internals; the detail stays
        // in the log only.
        let correlation_id = if status == StatusCode::INTERNAL_SERVER_ERROR {
            Some(uuid::Uuid::new_v4().to_string())
        } else {
            None
        };

        if self.is_server_error() {
            tracing::error!(
                error_code = error_code.as_u16(),
                correlation_id = correlation_id.as_deref(),
                %message,
                "Server error"
            );
        } else {
            tracing::debug!(error_code = error_code.as_u16(), %message, "Client error");
        }

        let public_message = match correlation_id {
            Some(ref id) => format!("Internal server error (correlation id {id})"),
            None => message,
        };

        let body = Json(json!({
            "error": {
                "code": error_code.as_u16(),
                "status": status.as_u16(),
                "message": public_message,
            }
        }));

        let mut response = (status, body).into_response();
        if let AppError::UpstreamRateLimited { retry_after_secs } = &self {
            let secs = retry_after_secs.unwrap_or(60);
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}
