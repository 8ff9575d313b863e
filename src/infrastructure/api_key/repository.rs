//! In-memory API key repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, OwnerId, UsageCounters};
use crate::domain::DomainError;

/// In-memory implementation of [`ApiKeyRepository`].
///
/// Default backend for development and tests. The single write lock makes
/// `commit_usage` an indivisible read-modify-write, matching the concurrency
/// contract of the trait.
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    keys: Arc<RwLock<HashMap<String, ApiKey>>>,
    prefix_index: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(id.as_str()).cloned())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DomainError> {
        let prefix_index = self.prefix_index.read().await;

        if let Some(key_id) = prefix_index.get(prefix) {
            let keys = self.keys.read().await;
            Ok(keys.get(key_id).cloned())
        } else {
            Ok(None)
        }
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        let mut prefix_index = self.prefix_index.write().await;

        let id = api_key.id().as_str().to_string();
        let prefix = api_key.key_prefix().to_string();

        if keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                id
            )));
        }

        if prefix_index.contains_key(&prefix) {
            return Err(DomainError::conflict(format!(
                "API key with prefix '{}' already exists",
                prefix
            )));
        }

        let name_taken = keys.values().any(|k| {
            k.owner_id() == api_key.owner_id() && k.is_active() && k.name() == api_key.name()
        });

        if name_taken {
            return Err(DomainError::conflict(format!(
                "Owner already has an active key named '{}'",
                api_key.name()
            )));
        }

        keys.insert(id.clone(), api_key.clone());
        prefix_index.insert(prefix, id);

        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        let id = api_key.id().as_str().to_string();

        if !keys.contains_key(&id) {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        keys.insert(id, api_key.clone());
        Ok(api_key.clone())
    }

    async fn deactivate(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;

        let key = keys
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        key.revoke();
        Ok(key.clone())
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let keys = self.keys.read().await;

        let mut result: Vec<ApiKey> = keys
            .values()
            .filter(|k| k.owner_id() == owner_id)
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        Ok(result)
    }

    async fn commit_usage(
        &self,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<UsageCounters, DomainError> {
        let mut keys = self.keys.write().await;

        let key = keys
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        Ok(key.record_admission(now))
    }
}
