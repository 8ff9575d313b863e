//! API Key domain
//!
//! Entities and traits for API key identity, quotas and lifecycle.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyId, ApiKeyParts, OwnerId, UsageCounters};
pub use repository::ApiKeyRepository;
pub use validation::{validate_key_name, KeyNameError};
