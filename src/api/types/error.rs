//! API error envelope
//!
//! Every error leaves the service as the same JSON shape:
//! `{"success": false, "error": "...", "resetAt": <unix seconds>?}` with
//! status 401 for authentication failures, 403 for authorization failures,
//! 429 for rate limiting (resetAt populated) and 500 for infrastructure
//! failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Message used for every authentication failure. Credential format errors
/// and hash mismatches are deliberately indistinguishable from outside.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing API key";

/// Serialized error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<i64>,
}

/// API error with HTTP status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                success: false,
                error: message.into(),
                reset_at: None,
            },
        }
    }

    /// Attach the instant a violated window reopens
    pub fn with_reset_at(mut self, reset_at: DateTime<Utc>) -> Self {
        self.body.reset_at = Some(reset_at.timestamp());
        self
    }

    /// Authentication failure with the uniform generic message
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE)
    }

    /// Authorization failure (tier, endpoint or IP)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Rate limit failure; callers should attach `resetAt`
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Infrastructure failure; distinct from authentication failures so
    /// monitoring can tell credential problems from store problems
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Conflict { message } => Self::conflict(message),
            DomainError::Credential { .. } => Self::unauthorized(),
            DomainError::Storage { .. } => Self::internal("Service temporarily unavailable"),
            DomainError::Internal { .. } => Self::internal("Internal error"),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.body.error)
    }
}

impl std::error::Error for ApiError {}
