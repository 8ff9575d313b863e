//! Application state for shared services

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::middleware::session::SessionAuth;
use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, OwnerId, UsageCounters};
use crate::domain::tier::Tier;
use crate::domain::usage::UsageRepository;
use crate::domain::DomainError;
use crate::infrastructure::api_key::{ApiKeyService, CreateKeyOptions, CreatedKey};
use crate::infrastructure::usage::UsageRecorder;

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub api_key_service: Arc<dyn ApiKeyServiceTrait>,
    pub usage_repository: Arc<dyn UsageRepository>,
    pub usage_recorder: UsageRecorder,
    pub session_auth: Arc<SessionAuth>,
}

impl AppState {
    pub fn new(
        api_key_service: Arc<dyn ApiKeyServiceTrait>,
        usage_repository: Arc<dyn UsageRepository>,
        usage_recorder: UsageRecorder,
        session_auth: Arc<SessionAuth>,
    ) -> Self {
        Self {
            api_key_service,
            usage_repository,
            usage_recorder,
            session_auth,
        }
    }
}

/// Trait for API key service operations
#[async_trait::async_trait]
pub trait ApiKeyServiceTrait: Send + Sync {
    /// Resolve and verify a presented credential; `Ok(None)` for any
    /// credential problem, `Err` only for store failures
    async fn authenticate(&self, credential: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Commit one admitted request against the key's counters
    async fn commit_usage(
        &self,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<UsageCounters, DomainError>;

    async fn create(
        &self,
        owner_id: OwnerId,
        name: String,
        tier: Tier,
        options: CreateKeyOptions,
    ) -> Result<CreatedKey, DomainError>;

    async fn rotate(&self, id: &ApiKeyId) -> Result<CreatedKey, DomainError>;

    async fn revoke(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError>;

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError>;
}

#[async_trait::async_trait]
impl<R: ApiKeyRepository + 'static> ApiKeyServiceTrait for ApiKeyService<R> {
    async fn authenticate(&self, credential: &str) -> Result<Option<ApiKey>, DomainError> {
        ApiKeyService::authenticate(self, credential).await
    }

    async fn commit_usage(
        &self,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<UsageCounters, DomainError> {
        ApiKeyService::commit_usage(self, id, now).await
    }

    async fn create(
        &self,
        owner_id: OwnerId,
        name: String,
        tier: Tier,
        options: CreateKeyOptions,
    ) -> Result<CreatedKey, DomainError> {
        ApiKeyService::create(self, owner_id, name, tier, options).await
    }

    async fn rotate(&self, id: &ApiKeyId) -> Result<CreatedKey, DomainError> {
        ApiKeyService::rotate(self, id).await
    }

    async fn revoke(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        ApiKeyService::revoke(self, id).await
    }

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        ApiKeyService::get(self, id).await
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        ApiKeyService::list_by_owner(self, owner_id).await
    }
}
