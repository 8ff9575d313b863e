//! Usage repository trait

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::{UsageQuery, UsageRecord};
use crate::domain::DomainError;

/// Repository trait for append-only usage records
#[async_trait]
pub trait UsageRepository: Send + Sync + Debug {
    /// Append a record. Records are write-once and never mutated.
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError>;

    /// Query records matching a filter, newest first
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError>;

    /// Count records matching a filter
    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError>;

    /// Purge records older than the cutoff; returns how many were removed
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError>;
}
