//! # API Errors
//!
//! Maps engine errors to HTTP status codes in one place.
//!
//! | Error | Status |
//! |---|---|
//! | `GateLocked` | 403 |
//! | `NotFound` | 404 |
//! | `InvalidInput` | 400 |
//! | missing or malformed player header | 401 |
//! | storage and internal failures | 500 |

use super::types::ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pulsar_core::PulsarError;

/// Handler error.
#[derive(Debug)]
pub enum ApiError {
    /// An engine refusal or failure.
    Engine(PulsarError),
    /// No player header on the request.
    MissingUser,
    /// Player header present but not a user id.
    InvalidUser,
    /// The blocking engine task could not complete.
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::MissingUser => write!(f, "Missing player identity"),
            Self::InvalidUser => write!(f, "Invalid player identity"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PulsarError> for ApiError {
    fn from(e: PulsarError) -> Self {
        Self::Engine(e)
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(PulsarError::GateLocked { .. }) => StatusCode::FORBIDDEN,
            Self::Engine(PulsarError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Engine(PulsarError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::MissingUser | Self::InvalidUser => StatusCode::UNAUTHORIZED,
            Self::Engine(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request refused");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let locked = ApiError::from(PulsarError::GateLocked {
            requested: 3,
            current: 1,
        });
        assert_eq!(locked.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(PulsarError::NotFound("quiz 1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(PulsarError::InvalidInput("gate 9".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::MissingUser.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(PulsarError::IoError("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
