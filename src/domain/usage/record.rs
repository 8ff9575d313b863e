//! Usage record entities
//!
//! Append-only facts about completed requests. Observability only: nothing
//! here feeds back into admission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::api_key::{ApiKeyId, OwnerId};

/// Unique identifier for a usage record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageRecordId(String);

impl UsageRecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique ID
    pub fn generate() -> Self {
        Self(format!("usage-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsageRecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UsageRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single completed-request record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    id: UsageRecordId,
    /// Key that made the request
    pub api_key_id: ApiKeyId,
    /// Account the key belongs to
    pub owner_id: OwnerId,
    /// Request path
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// Response status code
    pub status_code: u16,
    /// Response latency in milliseconds
    pub latency_ms: u64,
    /// Client user agent, if sent
    pub user_agent: Option<String>,
    /// Client address, if known
    pub client_ip: Option<String>,
    /// Error text for failed requests
    pub error: Option<String>,
    /// When the request completed
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        api_key_id: ApiKeyId,
        owner_id: OwnerId,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            id: UsageRecordId::generate(),
            api_key_id,
            owner_id,
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            latency_ms: 0,
            user_agent: None,
            client_ip: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Replace the generated id, used when rebuilding a stored record
    pub fn with_id(mut self, id: UsageRecordId) -> Self {
        self.id = id;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &UsageRecordId {
        &self.id
    }
}

/// Filter for querying usage records
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub api_key_id: Option<ApiKeyId>,
    pub owner_id: Option<OwnerId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl UsageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_api_key(mut self, id: ApiKeyId) -> Self {
        self.api_key_id = Some(id);
        self
    }

    pub fn for_owner(mut self, id: OwnerId) -> Self {
        self.owner_id = Some(id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes this filter (limit excluded)
    pub fn matches(&self, record: &UsageRecord) -> bool {
        if let Some(ref id) = self.api_key_id {
            if &record.api_key_id != id {
                return false;
            }
        }

        if let Some(ref owner) = self.owner_id {
            if &record.owner_id != owner {
                return false;
            }
        }

        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if record.timestamp >= until {
                return false;
            }
        }

        true
    }
}
