//! Domain layer - Core entities and repository traits

pub mod api_key;
pub mod error;
pub mod tier;
pub mod usage;

pub use api_key::{ApiKey, ApiKeyId, ApiKeyRepository, OwnerId, UsageCounters};
pub use error::DomainError;
pub use tier::{Tier, TierLimits, TierRegistry};
pub use usage::{UsageQuery, UsageRecord, UsageRecordId, UsageRepository};
