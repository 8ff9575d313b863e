//! API Key entity and related types

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::tier::{Tier, TierRegistry};

/// Unique API key identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiKeyId(String);

impl ApiKeyId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique identifier
    pub fn generate() -> Self {
        Self(format!("key-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApiKeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the account that owns a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counter values after an admission has been committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCounters {
    pub requests_used_today: u32,
    pub requests_used_this_minute: u32,
}

/// Every persisted field of an [`ApiKey`].
///
/// Storage implementations rebuild entities from this snapshot instead of
/// replaying lifecycle methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyParts {
    pub id: ApiKeyId,
    pub owner_id: OwnerId,
    pub name: String,
    pub key_prefix: String,
    pub secret_hash: String,
    pub tier: Tier,
    pub requests_per_day: Option<u32>,
    pub requests_per_minute: u32,
    pub requests_used_today: u32,
    pub requests_used_this_minute: u32,
    pub day_window_start: DateTime<Utc>,
    pub minute_window_start: DateTime<Utc>,
    pub ip_allowlist: Option<Vec<IpAddr>>,
    pub endpoint_allowlist: Option<Vec<String>>,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API Key entity
///
/// Owned by exactly one account. Never hard-deleted: revocation and rotation
/// flip `active` so historical usage stays attributable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    id: ApiKeyId,
    owner_id: OwnerId,
    /// Display name, unique per owner while active
    name: String,
    /// Cleartext lookup prefix (environment marker + non-secret fragment)
    key_prefix: String,
    /// Argon2 PHC hash of the full credential; never exposed in responses
    secret_hash: String,
    tier: Tier,
    /// Daily ceiling; `None` means unlimited
    requests_per_day: Option<u32>,
    requests_per_minute: u32,
    requests_used_today: u32,
    requests_used_this_minute: u32,
    day_window_start: DateTime<Utc>,
    minute_window_start: DateTime<Utc>,
    /// When present, only these addresses may use the key
    ip_allowlist: Option<Vec<IpAddr>>,
    /// When present, replaces the tier endpoint list for this key
    endpoint_allowlist: Option<Vec<String>>,
    active: bool,
    last_used_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new active key with quota defaults taken from the tier table
    pub fn new(
        id: ApiKeyId,
        owner_id: OwnerId,
        name: impl Into<String>,
        key_prefix: impl Into<String>,
        secret_hash: impl Into<String>,
        tier: Tier,
    ) -> Self {
        let now = Utc::now();
        let limits = TierRegistry::global().limits_for(tier);

        Self {
            id,
            owner_id,
            name: name.into(),
            key_prefix: key_prefix.into(),
            secret_hash: secret_hash.into(),
            tier,
            requests_per_day: limits.requests_per_day,
            requests_per_minute: limits.requests_per_minute,
            requests_used_today: 0,
            requests_used_this_minute: 0,
            day_window_start: now,
            minute_window_start: now,
            ip_allowlist: None,
            endpoint_allowlist: None,
            active: true,
            last_used_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the daily ceiling (`None` = unlimited)
    pub fn with_requests_per_day(mut self, limit: Option<u32>) -> Self {
        self.requests_per_day = limit;
        self
    }

    /// Override the per-minute ceiling
    pub fn with_requests_per_minute(mut self, limit: u32) -> Self {
        self.requests_per_minute = limit;
        self
    }

    pub fn with_ip_allowlist(mut self, allowlist: Vec<IpAddr>) -> Self {
        self.ip_allowlist = Some(allowlist);
        self
    }

    pub fn with_endpoint_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.endpoint_allowlist = Some(allowlist);
        self
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Rebuild an entity from storage
    pub fn from_parts(parts: ApiKeyParts) -> Self {
        Self {
            id: parts.id,
            owner_id: parts.owner_id,
            name: parts.name,
            key_prefix: parts.key_prefix,
            secret_hash: parts.secret_hash,
            tier: parts.tier,
            requests_per_day: parts.requests_per_day,
            requests_per_minute: parts.requests_per_minute,
            requests_used_today: parts.requests_used_today,
            requests_used_this_minute: parts.requests_used_this_minute,
            day_window_start: parts.day_window_start,
            minute_window_start: parts.minute_window_start,
            ip_allowlist: parts.ip_allowlist,
            endpoint_allowlist: parts.endpoint_allowlist,
            active: parts.active,
            last_used_at: parts.last_used_at,
            expires_at: parts.expires_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn to_parts(&self) -> ApiKeyParts {
        ApiKeyParts {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            name: self.name.clone(),
            key_prefix: self.key_prefix.clone(),
            secret_hash: self.secret_hash.clone(),
            tier: self.tier,
            requests_per_day: self.requests_per_day,
            requests_per_minute: self.requests_per_minute,
            requests_used_today: self.requests_used_today,
            requests_used_this_minute: self.requests_used_this_minute,
            day_window_start: self.day_window_start,
            minute_window_start: self.minute_window_start,
            ip_allowlist: self.ip_allowlist.clone(),
            endpoint_allowlist: self.endpoint_allowlist.clone(),
            active: self.active,
            last_used_at: self.last_used_at,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn requests_per_day(&self) -> Option<u32> {
        self.requests_per_day
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    pub fn requests_used_today(&self) -> u32 {
        self.requests_used_today
    }

    pub fn requests_used_this_minute(&self) -> u32 {
        self.requests_used_this_minute
    }

    pub fn day_window_start(&self) -> DateTime<Utc> {
        self.day_window_start
    }

    pub fn minute_window_start(&self) -> DateTime<Utc> {
        self.minute_window_start
    }

    pub fn ip_allowlist(&self) -> Option<&[IpAddr]> {
        self.ip_allowlist.as_deref()
    }

    pub fn endpoint_allowlist(&self) -> Option<&[String]> {
        self.endpoint_allowlist.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Status checks

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Active and not past its expiry instant
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now)
    }

    /// Whether the stored minute counter is stale for an evaluation at `now`
    pub fn minute_window_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.minute_window_start) >= Duration::seconds(60)
    }

    /// Whether `now` falls on a different UTC calendar day than the stored
    /// day window
    pub fn day_window_expired(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() != self.day_window_start.date_naive()
    }

    /// Whether an address passes the key's IP allow-list (no list = allow)
    pub fn allows_ip(&self, addr: IpAddr) -> bool {
        match &self.ip_allowlist {
            Some(list) => list.contains(&addr),
            None => true,
        }
    }

    // Mutators

    /// Flag the key inactive. Irreversible by design; rotation issues a new
    /// record instead of reactivating.
    pub fn revoke(&mut self) {
        self.active = false;
        self.touch();
    }

    /// Apply one admitted request: reset elapsed windows, bump both counters,
    /// stamp last use.
    ///
    /// Must run inside the repository's atomic section so the reset check and
    /// the increment are indivisible relative to concurrent admissions.
    pub fn record_admission(&mut self, now: DateTime<Utc>) -> UsageCounters {
        if self.minute_window_expired(now) {
            self.requests_used_this_minute = 0;
            self.minute_window_start = now;
        }

        if self.day_window_expired(now) {
            self.requests_used_today = 0;
            self.day_window_start = now;
        }

        self.requests_used_this_minute += 1;
        self.requests_used_today += 1;
        self.last_used_at = Some(now);
        self.touch();

        UsageCounters {
            requests_used_today: self.requests_used_today,
            requests_used_this_minute: self.requests_used_this_minute,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_key(tier: Tier) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            OwnerId::new("owner-1"),
            "Test Key",
            "md_test_abc12345",
            "$argon2id$stub",
            tier,
        )
    }

    #[test]
    fn test_new_key_defaults_from_tier() {
        let key = test_key(Tier::Free);

        assert_eq!(key.tier(), Tier::Free);
        assert_eq!(key.requests_per_day(), Some(100));
        assert_eq!(key.requests_per_minute(), 10);
        assert_eq!(key.requests_used_today(), 0);
        assert_eq!(key.requests_used_this_minute(), 0);
        assert!(key.is_active());
        assert!(key.last_used_at().is_none());
    }

    #[test]
    fn test_enterprise_daily_quota_is_unlimited() {
        let key = test_key(Tier::Enterprise);
        assert_eq!(key.requests_per_day(), None);
    }

    #[test]
    fn test_quota_overrides() {
        let key = test_key(Tier::Pro)
            .with_requests_per_day(Some(42))
            .with_requests_per_minute(7);

        assert_eq!(key.requests_per_day(), Some(42));
        assert_eq!(key.requests_per_minute(), 7);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let key = test_key(Tier::Free).with_expiration(now - Duration::hours(1));

        assert!(key.is_expired(now));
        assert!(!key.is_usable(now));

        let fresh = test_key(Tier::Free).with_expiration(now + Duration::hours(1));
        assert!(!fresh.is_expired(now));
        assert!(fresh.is_usable(now));
    }

    #[test]
    fn test_revoke() {
        let mut key = test_key(Tier::Free);
        let now = Utc::now();

        assert!(key.is_usable(now));
        key.revoke();
        assert!(!key.is_active());
        assert!(!key.is_usable(now));
    }

    #[test]
    fn test_record_admission_increments_both_counters() {
        let mut key = test_key(Tier::Free);
        let now = Utc::now();

        let counters = key.record_admission(now);

        assert_eq!(counters.requests_used_today, 1);
        assert_eq!(counters.requests_used_this_minute, 1);
        assert_eq!(key.last_used_at(), Some(now));
    }

    #[test]
    fn test_record_admission_resets_elapsed_minute_window() {
        let mut key = test_key(Tier::Free);
        let start = Utc::now();

        key.record_admission(start);
        key.record_admission(start);
        assert_eq!(key.requests_used_this_minute(), 2);

        let later = start + Duration::seconds(61);
        let counters = key.record_admission(later);

        assert_eq!(counters.requests_used_this_minute, 1);
        assert_eq!(key.minute_window_start(), later);
        // Same day: the day counter keeps accumulating
        assert_eq!(counters.requests_used_today, 3);
    }

    #[test]
    fn test_record_admission_resets_on_new_calendar_day() {
        let mut key = test_key(Tier::Free);
        let mut parts = key.to_parts();
        parts.requests_used_today = 100;
        parts.day_window_start = Utc::now() - Duration::days(1);
        key = ApiKey::from_parts(parts);

        let counters = key.record_admission(Utc::now());

        assert_eq!(counters.requests_used_today, 1);
    }

    #[test]
    fn test_minute_window_expiry_boundary() {
        let key = test_key(Tier::Free);
        let start = key.minute_window_start();

        assert!(!key.minute_window_expired(start + Duration::seconds(59)));
        assert!(key.minute_window_expired(start + Duration::seconds(60)));
    }

    #[test]
    fn test_ip_allowlist() {
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        let other: IpAddr = "10.9.9.9".parse().unwrap();

        let open = test_key(Tier::Free);
        assert!(open.allows_ip(addr));

        let restricted = test_key(Tier::Free).with_ip_allowlist(vec![addr]);
        assert!(restricted.allows_ip(addr));
        assert!(!restricted.allows_ip(other));
    }

    #[test]
    fn test_parts_round_trip() {
        let key = test_key(Tier::Pro)
            .with_endpoint_allowlist(vec!["/v1/screener".to_string()])
            .with_expiration(Utc::now() + Duration::days(30));

        let rebuilt = ApiKey::from_parts(key.to_parts());

        assert_eq!(rebuilt.id(), key.id());
        assert_eq!(rebuilt.tier(), key.tier());
        assert_eq!(rebuilt.endpoint_allowlist(), key.endpoint_allowlist());
        assert_eq!(rebuilt.expires_at(), key.expires_at());
    }
}
