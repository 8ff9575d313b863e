//! API Key infrastructure
//!
//! Credential minting, admission checks, storage backends and the lifecycle
//! service.

pub mod generator;
pub mod postgres;
pub mod rate_limiter;
pub mod repository;
pub mod service;

pub use generator::{parse_lookup_prefix, CredentialGenerator, Environment, GeneratedCredential};
pub use postgres::PostgresApiKeyRepository;
pub use rate_limiter::{AdmitDecision, DenyReason, QuotaRemaining, RateLimiter};
pub use repository::InMemoryApiKeyRepository;
pub use service::{ApiKeyService, CreateKeyOptions, CreatedKey};
