//! Key management endpoints
//!
//! Owner-session-protected surface for generating, rotating, revoking and
//! listing keys. Responses never carry the secret hash; the full credential
//! appears exactly once, in the create and rotate payloads.

use std::net::IpAddr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::OwnerSession;
use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::{ApiKey, ApiKeyId};
use crate::domain::tier::Tier;
use crate::domain::usage::UsageQuery;
use crate::infrastructure::api_key::CreateKeyOptions;

/// Request to create a new API key
#[derive(Debug, Clone, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub tier: Tier,
    #[serde(default)]
    pub requests_per_day: Option<u32>,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub ip_allowlist: Option<Vec<IpAddr>>,
    #[serde(default)]
    pub endpoint_allowlist: Option<Vec<String>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CreateKeyRequest> for CreateKeyOptions {
    fn from(req: CreateKeyRequest) -> Self {
        Self {
            requests_per_day: req.requests_per_day.map(Some),
            requests_per_minute: req.requests_per_minute,
            ip_allowlist: req.ip_allowlist,
            endpoint_allowlist: req.endpoint_allowlist,
            expires_at: req.expires_at,
        }
    }
}

/// API key response; the secret hash is never serialized
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub key_prefix: String,
    pub tier: Tier,
    /// `null` means unlimited
    pub requests_per_day: Option<u32>,
    pub requests_per_minute: u32,
    pub requests_used_today: u32,
    pub requests_used_this_minute: u32,
    pub ip_allowlist: Option<Vec<IpAddr>>,
    pub endpoint_allowlist: Option<Vec<String>>,
    pub active: bool,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id().as_str().to_string(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            tier: key.tier(),
            requests_per_day: key.requests_per_day(),
            requests_per_minute: key.requests_per_minute(),
            requests_used_today: key.requests_used_today(),
            requests_used_this_minute: key.requests_used_this_minute(),
            ip_allowlist: key.ip_allowlist().map(<[IpAddr]>::to_vec),
            endpoint_allowlist: key.endpoint_allowlist().map(<[String]>::to_vec),
            active: key.is_active(),
            last_used_at: key.last_used_at().map(|dt| dt.to_rfc3339()),
            expires_at: key.expires_at().map(|dt| dt.to_rfc3339()),
            created_at: key.created_at().to_rfc3339(),
            updated_at: key.updated_at().to_rfc3339(),
        }
    }
}

/// Key response with the one-time credential (creation and rotation only)
#[derive(Debug, Clone, Serialize)]
pub struct KeyWithCredentialResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub credential: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListKeysResponse {
    pub api_keys: Vec<ApiKeyResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UsageParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyUsageResponse {
    pub records: Vec<crate::domain::usage::UsageRecord>,
    pub total: usize,
}

/// GET /admin/keys
pub async fn list_keys(
    State(state): State<AppState>,
    OwnerSession(owner_id): OwnerSession,
) -> Result<Json<ListKeysResponse>, ApiError> {
    debug!(owner_id = %owner_id, "Listing API keys");

    let keys = state
        .api_key_service
        .list_by_owner(&owner_id)
        .await
        .map_err(ApiError::from)?;

    let api_keys: Vec<ApiKeyResponse> = keys.iter().map(ApiKeyResponse::from).collect();
    let total = api_keys.len();

    Ok(Json(ListKeysResponse { api_keys, total }))
}

/// POST /admin/keys
pub async fn create_key(
    State(state): State<AppState>,
    OwnerSession(owner_id): OwnerSession,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<KeyWithCredentialResponse>, ApiError> {
    debug!(owner_id = %owner_id, name = %request.name, tier = %request.tier, "Creating API key");

    let name = request.name.clone();
    let tier = request.tier;

    let created = state
        .api_key_service
        .create(owner_id, name, tier, request.into())
        .await
        .map_err(ApiError::from)?;

    Ok(Json(KeyWithCredentialResponse {
        api_key: ApiKeyResponse::from(&created.api_key),
        credential: created.credential,
    }))
}

/// POST /admin/keys/{key_id}/rotate
pub async fn rotate_key(
    State(state): State<AppState>,
    OwnerSession(owner_id): OwnerSession,
    Path(key_id): Path<String>,
) -> Result<Json<KeyWithCredentialResponse>, ApiError> {
    debug!(owner_id = %owner_id, key_id = %key_id, "Rotating API key");

    let id = owned_key_id(&state, &owner_id, &key_id).await?;

    let rotated = state
        .api_key_service
        .rotate(&id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(KeyWithCredentialResponse {
        api_key: ApiKeyResponse::from(&rotated.api_key),
        credential: rotated.credential,
    }))
}

/// POST /admin/keys/{key_id}/revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    OwnerSession(owner_id): OwnerSession,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    debug!(owner_id = %owner_id, key_id = %key_id, "Revoking API key");

    let id = owned_key_id(&state, &owner_id, &key_id).await?;

    let revoked = state
        .api_key_service
        .revoke(&id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiKeyResponse::from(&revoked)))
}

/// GET /admin/keys/{key_id}/usage
pub async fn key_usage(
    State(state): State<AppState>,
    OwnerSession(owner_id): OwnerSession,
    Path(key_id): Path<String>,
    Query(params): Query<UsageParams>,
) -> Result<Json<KeyUsageResponse>, ApiError> {
    let id = owned_key_id(&state, &owner_id, &key_id).await?;

    let query = UsageQuery::new()
        .for_api_key(id)
        .with_limit(params.limit.unwrap_or(100).min(1000));

    let records = state
        .usage_repository
        .query(&query)
        .await
        .map_err(ApiError::from)?;

    let total = records.len();

    Ok(Json(KeyUsageResponse { records, total }))
}

/// Resolve a key id and enforce ownership. Keys of other owners read as
/// not-found so the surface does not confirm their existence.
async fn owned_key_id(
    state: &AppState,
    owner_id: &crate::domain::api_key::OwnerId,
    key_id: &str,
) -> Result<ApiKeyId, ApiError> {
    let id = ApiKeyId::new(key_id);

    let key = state
        .api_key_service
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("API key '{}' not found", key_id)))?;

    if key.owner_id() != owner_id {
        return Err(ApiError::not_found(format!(
            "API key '{}' not found",
            key_id
        )));
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::header, http::StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::api::admin::create_admin_router;
    use crate::api::middleware::SessionAuth;
    use crate::domain::api_key::OwnerId;
    use crate::infrastructure::api_key::generator::test_support::fast_generator;
    use crate::infrastructure::api_key::{ApiKeyService, Environment, InMemoryApiKeyRepository};
    use crate::infrastructure::usage::{InMemoryUsageRepository, UsageRecorder};

    struct TestHarness {
        app: axum::Router,
        service: Arc<ApiKeyService<InMemoryApiKeyRepository>>,
        session_auth: Arc<SessionAuth>,
    }

    fn harness() -> TestHarness {
        let service = Arc::new(ApiKeyService::new(
            Arc::new(InMemoryApiKeyRepository::new()),
            fast_generator(Environment::Test),
        ));
        let usage = Arc::new(InMemoryUsageRepository::default());
        let recorder = UsageRecorder::spawn(usage.clone(), chrono::Duration::days(90));
        let session_auth = Arc::new(SessionAuth::new("test-secret"));

        let state = AppState::new(service.clone(), usage, recorder, session_auth.clone());

        let app = create_admin_router().with_state(state);

        TestHarness {
            app,
            service,
            session_auth,
        }
    }

    fn token(harness: &TestHarness, owner: &str) -> String {
        harness
            .session_auth
            .issue(&OwnerId::new(owner), chrono::Duration::hours(1))
            .unwrap()
    }

    fn request(
        method: &str,
        path: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));

        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_key_returns_credential_once() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        let response = harness
            .app
            .oneshot(request(
                "POST",
                "/keys",
                &token,
                Some(serde_json::json!({"name": "Trading Bot", "tier": "pro"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["name"], "Trading Bot");
        assert_eq!(body["tier"], "pro");
        assert!(body["credential"].as_str().unwrap().starts_with("md_test_"));
        // The hash never leaves the service
        assert!(body.get("secret_hash").is_none());
    }

    #[tokio::test]
    async fn test_list_keys_omits_secrets() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        harness
            .service
            .create(
                OwnerId::new("owner-1"),
                "Bot A",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();

        let response = harness
            .app
            .oneshot(request("GET", "/keys", &token, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["api_keys"][0]["name"], "Bot A");
        assert!(body["api_keys"][0].get("secret_hash").is_none());
        assert!(body["api_keys"][0].get("credential").is_none());
    }

    #[tokio::test]
    async fn test_list_only_shows_own_keys() {
        let harness = harness();

        harness
            .service
            .create(
                OwnerId::new("owner-1"),
                "Mine",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();
        harness
            .service
            .create(
                OwnerId::new("owner-2"),
                "Theirs",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();

        let token = token(&harness, "owner-1");
        let response = harness
            .app
            .oneshot(request("GET", "/keys", &token, None))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["api_keys"][0]["name"], "Mine");
    }

    #[tokio::test]
    async fn test_rotate_key() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        let created = harness
            .service
            .create(
                OwnerId::new("owner-1"),
                "Bot",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();

        let path = format!("/keys/{}/rotate", created.api_key.id());
        let response = harness
            .app
            .oneshot(request("POST", &path, &token, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let new_credential = body["credential"].as_str().unwrap().to_string();
        assert_ne!(new_credential, created.credential);

        // Old credential is dead, new one works
        assert!(harness
            .service
            .authenticate(&created.credential)
            .await
            .unwrap()
            .is_none());
        assert!(harness
            .service
            .authenticate(&new_credential)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_revoke_key() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        let created = harness
            .service
            .create(
                OwnerId::new("owner-1"),
                "Bot",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();

        let path = format!("/keys/{}/revoke", created.api_key.id());
        let response = harness
            .app
            .oneshot(request("POST", &path, &token, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["active"], false);

        assert!(harness
            .service
            .authenticate(&created.credential)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cannot_touch_other_owners_key() {
        let harness = harness();

        let created = harness
            .service
            .create(
                OwnerId::new("owner-2"),
                "Theirs",
                Tier::Free,
                CreateKeyOptions::default(),
            )
            .await
            .unwrap();

        let token = token(&harness, "owner-1");
        let path = format!("/keys/{}/revoke", created.api_key.id());

        let response = harness
            .app
            .oneshot(request("POST", &path, &token, None))
            .await
            .unwrap();

        // Reads as not-found rather than confirming the key exists
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthorized() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/keys")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_session_is_unauthorized() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(request("GET", "/keys", "not-a-valid-token", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_with_quota_overrides() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        let response = harness
            .app
            .oneshot(request(
                "POST",
                "/keys",
                &token,
                Some(serde_json::json!({
                    "name": "Throttled Bot",
                    "tier": "free",
                    "requests_per_day": 10,
                    "requests_per_minute": 2,
                    "ip_allowlist": ["203.0.113.7"]
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["requests_per_day"], 10);
        assert_eq!(body["requests_per_minute"], 2);
        assert_eq!(body["ip_allowlist"][0], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_create_with_unknown_tier_is_rejected() {
        let harness = harness();
        let token = token(&harness, "owner-1");

        let response = harness
            .app
            .oneshot(request(
                "POST",
                "/keys",
                &token,
                Some(serde_json::json!({"name": "Bot", "tier": "platinum"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
