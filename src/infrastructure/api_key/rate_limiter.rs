//! Rate limiter
//!
//! Fixed-window admission checks over the counters stored on a key record.
//! `admit` is read-only: it never mutates counters, so a persistence failure
//! can neither double-deny nor double-admit. The matching increment is the
//! repository's `commit_usage`, performed once per admitted request by the
//! gatekeeper.

use chrono::{DateTime, Duration, Utc};

use crate::domain::api_key::ApiKey;

/// Which ceiling stopped a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MinuteRateExceeded,
    DailyQuotaExhausted,
}

impl DenyReason {
    /// Client-facing phrasing, echoed in 429 bodies
    pub fn message(&self) -> &'static str {
        match self {
            Self::MinuteRateExceeded => "Minute rate limit exceeded",
            Self::DailyQuotaExhausted => "Daily request quota exhausted",
        }
    }
}

/// Daily quota left after this evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRemaining {
    Unlimited,
    Remaining(u32),
}

/// Outcome of an admission check
#[derive(Debug, Clone)]
pub struct AdmitDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    /// When the violated window opens again; set on denials
    pub reset_at: Option<DateTime<Utc>>,
    pub remaining: QuotaRemaining,
}

/// Stateless admission evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiter;

impl RateLimiter {
    /// Evaluate whether a request for this key is admitted at `now`.
    ///
    /// Elapsed windows are treated as zeroed for this evaluation only; the
    /// actual reset is persisted by `commit_usage` so concurrent readers
    /// cannot lose counts.
    pub fn admit(key: &ApiKey, now: DateTime<Utc>) -> AdmitDecision {
        let minute_count = if key.minute_window_expired(now) {
            0
        } else {
            key.requests_used_this_minute()
        };

        if minute_count >= key.requests_per_minute() {
            return AdmitDecision {
                allowed: false,
                reason: Some(DenyReason::MinuteRateExceeded),
                reset_at: Some(key.minute_window_start() + Duration::seconds(60)),
                remaining: Self::daily_remaining(key, now),
            };
        }

        if let Some(daily_limit) = key.requests_per_day() {
            let day_count = if key.day_window_expired(now) {
                0
            } else {
                key.requests_used_today()
            };

            if day_count >= daily_limit {
                return AdmitDecision {
                    allowed: false,
                    reason: Some(DenyReason::DailyQuotaExhausted),
                    reset_at: Some(next_day_start(now)),
                    remaining: QuotaRemaining::Remaining(0),
                };
            }

            return AdmitDecision {
                allowed: true,
                reason: None,
                reset_at: None,
                remaining: QuotaRemaining::Remaining(daily_limit - day_count),
            };
        }

        AdmitDecision {
            allowed: true,
            reason: None,
            reset_at: None,
            remaining: QuotaRemaining::Unlimited,
        }
    }

    fn daily_remaining(key: &ApiKey, now: DateTime<Utc>) -> QuotaRemaining {
        match key.requests_per_day() {
            None => QuotaRemaining::Unlimited,
            Some(limit) => {
                let used = if key.day_window_expired(now) {
                    0
                } else {
                    key.requests_used_today()
                };

                QuotaRemaining::Remaining(limit.saturating_sub(used))
            }
        }
    }
}

/// Start of the next UTC calendar day. Day windows reset at day boundaries,
/// not on a rolling 24h basis.
pub fn next_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = now.date_naive() + Duration::days(1);

    next_day
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::{ApiKey, ApiKeyId, OwnerId};
    use crate::domain::tier::Tier;

    fn key_with_limits(per_day: Option<u32>, per_minute: u32) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            OwnerId::new("owner-1"),
            "Limiter Key",
            "md_test_limiter1",
            "$argon2id$stub",
            Tier::Free,
        )
        .with_requests_per_day(per_day)
        .with_requests_per_minute(per_minute)
    }

    fn with_counters(
        mut key: ApiKey,
        today: u32,
        this_minute: u32,
        now: DateTime<Utc>,
    ) -> ApiKey {
        let mut parts = key.to_parts();
        parts.requests_used_today = today;
        parts.requests_used_this_minute = this_minute;
        parts.day_window_start = now;
        parts.minute_window_start = now;
        key = ApiKey::from_parts(parts);
        key
    }

    #[test]
    fn test_admits_fresh_key() {
        let key = key_with_limits(Some(100), 10);
        let decision = RateLimiter::admit(&key, Utc::now());

        assert!(decision.allowed);
        assert!(decision.reason.is_none());
        assert_eq!(decision.remaining, QuotaRemaining::Remaining(100));
    }

    #[test]
    fn test_denies_at_minute_ceiling() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(Some(100), 2), 2, 2, now);

        let decision = RateLimiter::admit(&key, now + Duration::seconds(5));

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::MinuteRateExceeded));

        // Reset lands within 60 seconds of the window start
        let reset_at = decision.reset_at.unwrap();
        assert_eq!(reset_at, key.minute_window_start() + Duration::seconds(60));
    }

    #[test]
    fn test_minute_window_elapse_readmits() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(Some(100), 2), 2, 2, now);

        let decision = RateLimiter::admit(&key, now + Duration::seconds(61));

        assert!(decision.allowed);
    }

    #[test]
    fn test_denies_exhausted_daily_quota() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(Some(100), 1000), 100, 0, now);

        let decision = RateLimiter::admit(&key, now);

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::DailyQuotaExhausted));
        assert_eq!(decision.remaining, QuotaRemaining::Remaining(0));
        assert_eq!(decision.reset_at, Some(next_day_start(now)));
    }

    #[test]
    fn test_day_boundary_readmits() {
        let now = Utc::now();
        let yesterday = now - Duration::days(1);
        let key = with_counters(key_with_limits(Some(100), 1000), 100, 0, yesterday);

        let decision = RateLimiter::admit(&key, now);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, QuotaRemaining::Remaining(100));
    }

    #[test]
    fn test_minute_check_runs_before_daily() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(Some(100), 2), 100, 2, now);

        let decision = RateLimiter::admit(&key, now);

        assert_eq!(decision.reason, Some(DenyReason::MinuteRateExceeded));
    }

    #[test]
    fn test_unlimited_daily_quota() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(None, 1000), 1_000_000, 0, now);

        let decision = RateLimiter::admit(&key, now);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, QuotaRemaining::Unlimited);
    }

    #[test]
    fn test_remaining_counts_down() {
        let now = Utc::now();
        let key = with_counters(key_with_limits(Some(100), 1000), 37, 0, now);

        let decision = RateLimiter::admit(&key, now);

        assert_eq!(decision.remaining, QuotaRemaining::Remaining(63));
    }

    #[test]
    fn test_next_day_start() {
        let now = Utc::now();
        let reset = next_day_start(now);

        assert!(reset > now);
        assert_eq!(reset.date_naive(), now.date_naive() + Duration::days(1));
        assert_eq!(reset.time(), chrono::NaiveTime::MIN);
    }
}
