//! Usage domain
//!
//! Append-only observability records for completed requests.

mod record;
mod repository;

pub use record::{UsageQuery, UsageRecord, UsageRecordId};
pub use repository::UsageRepository;
