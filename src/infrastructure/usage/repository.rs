//! In-memory usage repository implementation

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::usage::{UsageQuery, UsageRecord, UsageRecordId, UsageRepository};
use crate::domain::DomainError;

/// In-memory usage repository with a bounded record count
#[derive(Debug)]
pub struct InMemoryUsageRepository {
    records: RwLock<HashMap<UsageRecordId, UsageRecord>>,
    max_records: usize,
}

impl InMemoryUsageRepository {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_records,
        }
    }

    /// Evict oldest records if over limit
    fn evict_if_needed(&self, records: &mut HashMap<UsageRecordId, UsageRecord>) {
        if records.len() <= self.max_records {
            return;
        }

        let mut entries: Vec<_> = records
            .iter()
            .map(|(k, v)| (k.clone(), v.timestamp))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let to_remove = records.len() - self.max_records;
        for (id, _) in entries.into_iter().take(to_remove) {
            records.remove(&id);
        }
    }
}

impl Default for InMemoryUsageRepository {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        records.insert(record.id().clone(), record);
        self.evict_if_needed(&mut records);

        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError> {
        let records = self
            .records
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut results: Vec<UsageRecord> = records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError> {
        let records = self
            .records
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(records.values().filter(|r| query.matches(r)).count())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        let before = records.len();
        records.retain(|_, r| r.timestamp >= cutoff);

        Ok(before - records.len())
    }
}
