//! In-memory response cache
//!
//! Short-lived cache of serialized upstream responses sitting in the request
//! path. TTLs are chosen per route from a priority-ordered table.

pub mod key;
pub mod response;

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How volatile a route's data is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    /// Full player dumps and trending lists, refreshed daily
    Bulk,
    /// Rosters, league membership, a user's leagues
    List,
    /// Live matchups, transactions, season state
    Volatile,
    /// Everything else
    Default,
}

/// Cache TTL per volatility class, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlTiers {
    pub bulk_secs: u64,
    pub list_secs: u64,
    pub volatile_secs: u64,
    pub default_secs: u64,
}

impl Default for TtlTiers {
    fn default() -> Self {
        Self {
            bulk_secs: 24 * 60 * 60, // 24 hr
            list_secs: 30 * 60,      // 30 min
            volatile_secs: 60,       // 1 min
            default_secs: 5 * 60,    // 5 min
        }
    }
}

impl TtlTiers {
    pub fn ttl(&self, class: TtlClass) -> Duration {
        let secs = match class {
            TtlClass::Bulk => self.bulk_secs,
            TtlClass::List => self.list_secs,
            TtlClass::Volatile => self.volatile_secs,
            TtlClass::Default => self.default_secs,
        };
        Duration::from_secs(secs)
    }

    /// TTL for a request path
    pub fn ttl_for_path(&self, path: &str) -> Duration {
        self.ttl(TtlClass::from_path(path))
    }
}

/// Route patterns checked in order; first match wins.
static TTL_RULES: LazyLock<Vec<(Regex, TtlClass)>> = LazyLock::new(|| {
    [
        (r"^/league/[^/]+/matchups(/|$)", TtlClass::Volatile),
        (r"^/league/[^/]+/transactions(/|$)", TtlClass::Volatile),
        (r"^/state(/|$)", TtlClass::Volatile),
        (r"^/league/[^/]+/(rosters|users)/?$", TtlClass::List),
        (r"^/user/[^/]+/leagues(/|$)", TtlClass::List),
        (r"^/players/[^/]+/trending/(add|drop)/?$", TtlClass::Bulk),
        (r"^/players/[^/]+/?$", TtlClass::Bulk),
    ]
    .into_iter()
    .map(|(pattern, class)| (Regex::new(pattern).expect("valid TTL route pattern"), class))
    .collect()
});

impl TtlClass {
    /// Classify a request path. The path may carry a `/v1` prefix.
    pub fn from_path(path: &str) -> Self {
        let path = path.strip_prefix("/v1").unwrap_or(path);

        TTL_RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(path))
            .map(|(_, class)| *class)
            .unwrap_or(TtlClass::Default)
    }
}

/// Whether a finished request may be stored in the response cache.
///
/// Only successful reads qualify. Authentication and liveness endpoints are
/// never cached whatever their status.
pub fn is_cacheable(method: &reqwest::Method, path: &str, status: u16) -> bool {
    if *method != reqwest::Method::GET || !(200..300).contains(&status) {
        return false;
    }
    let path = path.strip_prefix("/v1").unwrap_or(path);
    !(path.starts_with("/auth") || path == "/health" || path.starts_with("/health/"))
}

// Re-export main types
pub use key::fingerprint;
pub use response::{CacheStats, KeyMatcher, ResponseCache};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_routes() {
        assert_eq!(TtlClass::from_path("/players/nfl"), TtlClass::Bulk);
        assert_eq!(TtlClass::from_path("/v1/players/nfl"), TtlClass::Bulk);
        assert_eq!(
            TtlClass::from_path("/players/nfl/trending/add"),
            TtlClass::Bulk
        );
    }

    #[test]
    fn test_list_routes() {
        assert_eq!(TtlClass::from_path("/league/123/rosters"), TtlClass::List);
        assert_eq!(TtlClass::from_path("/league/123/users"), TtlClass::List);
        assert_eq!(
            TtlClass::from_path("/user/abc/leagues/nfl/2024"),
            TtlClass::List
        );
    }

    #[test]
    fn test_volatile_routes() {
        assert_eq!(
            TtlClass::from_path("/league/123/matchups/4"),
            TtlClass::Volatile
        );
        assert_eq!(
            TtlClass::from_path("/league/123/transactions/1"),
            TtlClass::Volatile
        );
        assert_eq!(TtlClass::from_path("/state/nfl"), TtlClass::Volatile);
    }

    #[test]
    fn test_default_routes() {
        assert_eq!(TtlClass::from_path("/league/123"), TtlClass::Default);
        assert_eq!(TtlClass::from_path("/user/abc"), TtlClass::Default);
        assert_eq!(TtlClass::from_path("/unknown/path"), TtlClass::Default);
    }

    #[test]
    fn test_bulk_and_live_ttls_differ() {
        let tiers = TtlTiers::default();
        let bulk = tiers.ttl_for_path("/players/nfl");
        let live = tiers.ttl_for_path("/league/1/matchups/3");

        assert_eq!(bulk, Duration::from_secs(24 * 60 * 60));
        assert_eq!(live, Duration::from_secs(60));
        assert_ne!(bulk, live);
    }

    #[test]
    fn test_configured_tiers_are_used() {
        let tiers = TtlTiers {
            bulk_secs: 7,
            list_secs: 5,
            volatile_secs: 1,
            default_secs: 3,
        };
        assert_eq!(tiers.ttl_for_path("/players/nba"), Duration::from_secs(7));
        assert_eq!(tiers.ttl_for_path("/league/9/rosters"), Duration::from_secs(5));
        assert_eq!(tiers.ttl_for_path("/state/nfl"), Duration::from_secs(1));
        assert_eq!(tiers.ttl_for_path("/draft/1"), Duration::from_secs(3));
    }

    #[test]
    fn test_cacheability() {
        let get = reqwest::Method::GET;
        assert!(is_cacheable(&get, "/players/nfl", 200));
        assert!(!is_cacheable(&get, "/players/nfl", 500));
        assert!(!is_cacheable(&get, "/players/nfl", 404));
        assert!(!is_cacheable(&reqwest::Method::POST, "/league/1", 200));
        assert!(!is_cacheable(&get, "/auth/login", 200));
        assert!(!is_cacheable(&get, "/health", 200));
    }
}
