//! Owner session authentication for the management surface
//!
//! The dashboard issues short-lived HS256 session tokens for signed-in
//! owners; this side only validates them. Management endpoints are never
//! reachable with a data-plane API key.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::OwnerId;
use crate::domain::DomainError;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Owner account id
    sub: String,
    /// Expiry, unix seconds
    exp: i64,
}

/// Validator (and, for tooling, issuer) of owner session tokens
pub struct SessionAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuth").finish()
    }
}

impl SessionAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Issue a session token. Used by tests and local tooling; production
    /// tokens come from the dashboard sharing the same secret.
    pub fn issue(
        &self,
        owner_id: &OwnerId,
        ttl: chrono::Duration,
    ) -> Result<String, DomainError> {
        let claims = SessionClaims {
            sub: owner_id.as_str().to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| DomainError::internal(format!("Failed to issue session token: {}", e)))
    }

    /// Validate a token and return the owner it belongs to
    pub fn verify(&self, token: &str) -> Result<OwnerId, DomainError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| OwnerId::new(data.claims.sub))
            .map_err(|e| DomainError::credential(format!("Invalid session token: {}", e)))
    }
}

/// Extractor that requires a valid owner session on management routes
#[derive(Debug, Clone)]
pub struct OwnerSession(pub OwnerId);

impl FromRequestParts<AppState> for OwnerSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::UNAUTHORIZED,
                    "Owner session required",
                )
            })?;

        match state.session_auth.verify(token) {
            Ok(owner_id) => {
                debug!(owner_id = %owner_id, "Owner session validated");
                Ok(OwnerSession(owner_id))
            }
            Err(_) => Err(ApiError::new(
                axum::http::StatusCode::UNAUTHORIZED,
                "Invalid or expired session",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_issue_and_verify() {
        let auth = SessionAuth::new("test-secret");
        let owner = OwnerId::new("owner-1");

        let token = auth.issue(&owner, Duration::hours(1)).unwrap();
        let verified = auth.verify(&token).unwrap();

        assert_eq!(verified, owner);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let issuer = SessionAuth::new("secret-a");
        let verifier = SessionAuth::new("secret-b");

        let token = issuer
            .issue(&OwnerId::new("owner-1"), Duration::hours(1))
            .unwrap();

        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let auth = SessionAuth::new("test-secret");

        let token = auth
            .issue(&OwnerId::new("owner-1"), Duration::seconds(-120))
            .unwrap();

        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let auth = SessionAuth::new("test-secret");

        assert!(auth.verify("not-a-jwt").is_err());
        assert!(auth.verify("").is_err());
    }
}
