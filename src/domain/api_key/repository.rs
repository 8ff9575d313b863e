//! API Key repository trait

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entity::{ApiKey, ApiKeyId, OwnerId, UsageCounters};
use crate::domain::DomainError;

/// Repository trait for API key storage
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Get an API key by its ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// Get an API key by its cleartext lookup prefix (authentication path)
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Create a new API key.
    ///
    /// Fails with a conflict if the prefix is taken or the owner already has
    /// an active key with the same name.
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Update an existing API key
    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError>;

    /// Flag a key inactive. Keys are never hard-deleted.
    async fn deactivate(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError>;

    /// List all keys belonging to an owner, newest first
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError>;

    /// Commit one admitted request: reset elapsed windows, increment both
    /// counters and stamp `last_used_at`, as a single indivisible operation
    /// against the store. Returns the counters after the increment.
    async fn commit_usage(
        &self,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<UsageCounters, DomainError>;
}
