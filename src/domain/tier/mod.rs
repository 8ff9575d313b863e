//! Tier registry
//!
//! Static mapping from capability tier to quota limits and reachable
//! endpoints. The table is compiled into the process; changing a tier is a
//! one-place edit here.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capability tier of an API key.
///
/// Variants are declared lowest-capability first so the derived ordering is
/// the capability order (`Free < Starter < Pro < Enterprise`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, in ascending capability order
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Starter, Tier::Pro, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Capability check independent of rate limits
    pub fn meets(&self, required: Tier) -> bool {
        *self >= required
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized tier names
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Unknown tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Quota limits for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Daily request ceiling; `None` means unlimited
    pub requests_per_day: Option<u32>,
    /// Per-minute request ceiling
    pub requests_per_minute: u32,
}

/// Static description of a tier
#[derive(Debug, Clone)]
pub struct TierDescriptor {
    pub tier: Tier,
    pub display_name: &'static str,
    pub limits: TierLimits,
    /// Endpoint allow-list: exact paths or single-wildcard patterns; `"*"`
    /// permits every path
    pub endpoints: &'static [&'static str],
    /// Informational only, not enforced here
    pub features: &'static [&'static str],
}

const DESCRIPTORS: [TierDescriptor; 4] = [
    TierDescriptor {
        tier: Tier::Free,
        display_name: "Free",
        limits: TierLimits {
            requests_per_day: Some(100),
            requests_per_minute: 10,
        },
        endpoints: &["/v1/quotes/*", "/v1/symbols"],
        features: &["Delayed quotes", "Symbol directory"],
    },
    TierDescriptor {
        tier: Tier::Starter,
        display_name: "Starter",
        limits: TierLimits {
            requests_per_day: Some(5_000),
            requests_per_minute: 60,
        },
        endpoints: &["/v1/quotes/*", "/v1/symbols", "/v1/candles/*"],
        features: &["Real-time quotes", "Symbol directory", "Historical candles"],
    },
    TierDescriptor {
        tier: Tier::Pro,
        display_name: "Pro",
        limits: TierLimits {
            requests_per_day: Some(50_000),
            requests_per_minute: 300,
        },
        endpoints: &[
            "/v1/quotes/*",
            "/v1/symbols",
            "/v1/candles/*",
            "/v1/indicators/*",
            "/v1/screener",
        ],
        features: &[
            "Real-time quotes",
            "Symbol directory",
            "Historical candles",
            "Technical indicators",
            "Market screener",
        ],
    },
    TierDescriptor {
        tier: Tier::Enterprise,
        display_name: "Enterprise",
        limits: TierLimits {
            requests_per_day: None,
            requests_per_minute: 1_000,
        },
        endpoints: &["*"],
        features: &["Full API access", "Unlimited daily volume", "Priority support"],
    },
];

/// Check a single allow-list entry against a request path.
///
/// `"*"` matches everything. An entry containing a `*` is compiled to an
/// anchored expression where the wildcard matches any run of characters.
/// Matching is case-sensitive and covers the whole path.
pub fn matches_endpoint(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') {
        return pattern == path;
    }

    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match Regex::new(&format!("^{}$", body)) {
        Ok(re) => re.is_match(path),
        Err(_) => false,
    }
}

enum EndpointPattern {
    Any,
    Exact(&'static str),
    Wildcard(Regex),
}

impl EndpointPattern {
    fn compile(pattern: &'static str) -> Self {
        if pattern == "*" {
            return Self::Any;
        }

        if !pattern.contains('*') {
            return Self::Exact(pattern);
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        match Regex::new(&format!("^{}$", body)) {
            Ok(re) => Self::Wildcard(re),
            Err(_) => Self::Exact(pattern),
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => *p == path,
            Self::Wildcard(re) => re.is_match(path),
        }
    }
}

struct TierEntry {
    descriptor: TierDescriptor,
    patterns: Vec<EndpointPattern>,
}

/// Read-only lookup over the static tier table
pub struct TierRegistry {
    entries: [TierEntry; 4],
}

static REGISTRY: Lazy<TierRegistry> = Lazy::new(|| TierRegistry {
    entries: DESCRIPTORS.map(|descriptor| {
        let patterns = descriptor
            .endpoints
            .iter()
            .copied()
            .map(EndpointPattern::compile)
            .collect();

        TierEntry {
            descriptor,
            patterns,
        }
    }),
});

impl TierRegistry {
    /// The process-wide registry
    pub fn global() -> &'static TierRegistry {
        &REGISTRY
    }

    pub fn descriptor(&self, tier: Tier) -> &TierDescriptor {
        &self.entries[tier as usize].descriptor
    }

    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        self.entries[tier as usize].descriptor.limits
    }

    pub fn is_endpoint_allowed(&self, tier: Tier, path: &str) -> bool {
        self.entries[tier as usize]
            .patterns
            .iter()
            .any(|p| p.is_match(path))
    }

    /// Lowest tier whose allow-list reaches the path, for upgrade hints
    pub fn minimum_tier_for(&self, path: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| self.is_endpoint_allowed(*tier, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Free < Tier::Starter);
        assert!(Tier::Starter < Tier::Pro);
        assert!(Tier::Pro < Tier::Enterprise);

        assert!(Tier::Enterprise.meets(Tier::Free));
        assert!(Tier::Pro.meets(Tier::Pro));
        assert!(!Tier::Free.meets(Tier::Starter));
    }

    #[test]
    fn test_tier_parse_and_display() {
        assert_eq!("pro".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!("enterprise".parse::<Tier>().unwrap(), Tier::Enterprise);
        assert_eq!(Tier::Starter.to_string(), "starter");
        assert_eq!(
            "platinum".parse::<Tier>(),
            Err(UnknownTier("platinum".to_string()))
        );
    }

    #[test]
    fn test_tier_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Free).unwrap(), "\"free\"");

        let tier: Tier = serde_json::from_str("\"enterprise\"").unwrap();
        assert_eq!(tier, Tier::Enterprise);
    }

    #[test]
    fn test_limits_for() {
        let registry = TierRegistry::global();

        let free = registry.limits_for(Tier::Free);
        assert_eq!(free.requests_per_day, Some(100));
        assert_eq!(free.requests_per_minute, 10);

        let enterprise = registry.limits_for(Tier::Enterprise);
        assert_eq!(enterprise.requests_per_day, None);
    }

    #[test]
    fn test_exact_endpoint_match() {
        let registry = TierRegistry::global();

        assert!(registry.is_endpoint_allowed(Tier::Free, "/v1/symbols"));
        assert!(!registry.is_endpoint_allowed(Tier::Free, "/v1/symbols/extra"));
    }

    #[test]
    fn test_wildcard_endpoint_match() {
        let registry = TierRegistry::global();

        assert!(registry.is_endpoint_allowed(Tier::Free, "/v1/quotes/AAPL"));
        assert!(registry.is_endpoint_allowed(Tier::Starter, "/v1/candles/MSFT"));
        assert!(!registry.is_endpoint_allowed(Tier::Free, "/v1/candles/MSFT"));
        assert!(!registry.is_endpoint_allowed(Tier::Starter, "/v1/screener"));
    }

    #[test]
    fn test_universal_wildcard() {
        let registry = TierRegistry::global();

        assert!(registry.is_endpoint_allowed(Tier::Enterprise, "/v1/screener"));
        assert!(registry.is_endpoint_allowed(Tier::Enterprise, "/v1/anything/else"));
    }

    #[test]
    fn test_matching_is_anchored() {
        assert!(matches_endpoint("/v1/quotes/*", "/v1/quotes/AAPL"));
        assert!(!matches_endpoint("/v1/quotes/*", "prefix/v1/quotes/AAPL"));
        assert!(!matches_endpoint("quotes", "/v1/quotes"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert!(!matches_endpoint("/v1/Quotes/*", "/v1/quotes/AAPL"));
        assert!(!matches_endpoint("/v1/symbols", "/v1/SYMBOLS"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(!matches_endpoint("/v1/quotes/.", "/v1/quotes/X"));
        assert!(matches_endpoint("/v1/quotes/.", "/v1/quotes/."));
    }

    #[test]
    fn test_minimum_tier_for() {
        let registry = TierRegistry::global();

        assert_eq!(registry.minimum_tier_for("/v1/symbols"), Some(Tier::Free));
        assert_eq!(
            registry.minimum_tier_for("/v1/candles/AAPL"),
            Some(Tier::Starter)
        );
        assert_eq!(registry.minimum_tier_for("/v1/screener"), Some(Tier::Pro));
        assert_eq!(
            registry.minimum_tier_for("/v1/not-a-real-endpoint"),
            Some(Tier::Enterprise)
        );
    }
}
