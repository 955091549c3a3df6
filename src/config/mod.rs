//! Configuration management for Courtside
//!
//! Everything here is read-only once loaded. A missing config file is not an
//! error: every section falls back to its defaults.

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TtlTiers;
use crate::error::{ConfigError, Result};

/// Public Sleeper API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.sleeper.app/v1";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the snapshot database (defaults to the XDG data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub refresh: RefreshConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

/// Upstream HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Pace applied after the upstream first answers 429
    pub requests_per_minute: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: format!("courtside/{}", env!("CARGO_PKG_VERSION")),
            requests_per_minute: 1000,
        }
    }
}

/// Retry/backoff settings for upstream calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            jitter_ms: 1000,
        }
    }
}

/// Bulk dataset refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Local time of day for the daily refresh, "HH:MM"
    pub time_of_day: String,
    /// IANA time zone name
    pub timezone: String,
    pub sport: String,
    pub trending_lookback_hours: u32,
    pub trending_limit: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            time_of_day: "03:00".to_string(),
            timezone: "America/New_York".to_string(),
            sport: "nfl".to_string(),
            trending_lookback_hours: 24,
            trending_limit: 25,
        }
    }
}

impl RefreshConfig {
    pub fn time_of_day(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.time_of_day, "%H:%M").map_err(|e| {
            ConfigError::Invalid(format!(
                "refresh.time_of_day '{}' is not HH:MM ({})",
                self.time_of_day, e
            ))
            .into()
        })
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            ConfigError::Invalid(format!("unknown time zone '{}'", self.timezone)).into()
        })
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub sweep_interval_secs: u64,
    pub ttl: TtlTiers,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            sweep_interval_secs: 60,
            ttl: TtlTiers::default(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Per-session request quotas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub authenticated: u32,
    pub anonymous: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            authenticated: 100,
            anonymous: 20,
            window_ms: 60_000,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".courtside").join("config.yaml"))
    }

    /// Load from an explicit path, or the default location when `None`.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path()?,
        };
        Self::load_from(&path)
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the core cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".into()).into());
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("cache.sweep_interval_secs must be at least 1".into()).into(),
            );
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()).into());
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_ms must be at least 1".into()).into());
        }
        if self.upstream.requests_per_minute == 0 {
            return Err(
                ConfigError::Invalid("upstream.requests_per_minute must be at least 1".into())
                    .into(),
            );
        }
        self.refresh.time_of_day()?;
        self.refresh.timezone()?;
        Ok(())
    }

    /// Resolve where the snapshot database lives
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("courtside")))
    }
}
