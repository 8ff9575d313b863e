//! Usage infrastructure
//!
//! Storage backends and the background recorder for usage records.

pub mod postgres;
pub mod recorder;
pub mod repository;

pub use postgres::PostgresUsageRepository;
pub use recorder::UsageRecorder;
pub use repository::InMemoryUsageRepository;
