//! Error types for the relay core

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the relay core distinguishes (see §7 of the design)
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or unrecognized message type
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, forged, or expired bearer token
    #[error("unauthenticated")]
    Unauthenticated,

    /// Ownership or cross-account violation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No such device, code, or pairing
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate username, email, or pairing
    #[error("conflict: {0}")]
    Conflict(String),

    /// Pairing code expired or already consumed
    #[error("gone: {0}")]
    Gone(String),

    /// Credential endpoint rate limit exceeded
    #[error("too many attempts, retry after {retry_after_secs}s")]
    TooManyAttempts {
        /// Seconds until the caller may retry
        retry_after_secs: u64,
    },

    /// Store or external identity provider unreachable
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gone(_) => StatusCode::GONE,
            Self::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) | Self::Database(_) | Self::Io(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let mut response = (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response();

        if let Self::TooManyAttempts { retry_after_secs } = &self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
