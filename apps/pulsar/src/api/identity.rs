//! # Player Identity
//!
//! Login is handled by a fronting auth service, which forwards the
//! authenticated user id in the `X-Pulsar-User` header. Every player route
//! extracts a [`Player`]; requests without a valid header are rejected with
//! 401 before reaching the engine.

use super::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use pulsar_core::UserId;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-pulsar-user";

/// The authenticated player of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Player(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Player {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or(ApiError::MissingUser)?;

        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                tracing::warn!(
                    event = "identity_failure",
                    reason = "malformed_user_header",
                    "Rejected malformed player header"
                );
                ApiError::InvalidUser
            })?;

        Ok(Self(UserId(id)))
    }
}
