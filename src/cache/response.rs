//! Bounded TTL + LRU response cache
//!
//! Entries expire on access and through a periodic background sweep. When the
//! cache is full, the entry with the oldest `last_accessed` is evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::CacheError;

/// A cached response payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Selects keys for bulk invalidation
#[derive(Debug, Clone)]
pub enum KeyMatcher {
    /// Key contains this literal text
    Substring(String),
    /// Key matches this compiled pattern
    Pattern(Regex),
}

impl KeyMatcher {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Substring(needle) => key.contains(needle.as_str()),
            KeyMatcher::Pattern(re) => re.is_match(key),
        }
    }
}

impl From<&str> for KeyMatcher {
    fn from(s: &str) -> Self {
        KeyMatcher::Substring(s.to_string())
    }
}

impl From<Regex> for KeyMatcher {
    fn from(re: Regex) -> Self {
        KeyMatcher::Pattern(re)
    }
}

/// Counters exposed for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

struct SweepHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Process-local response cache shared by request handlers
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            sweeper: Mutex::new(None),
        }
    }

    /// Get cached data if it has not expired
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let mut guard = self.inner.lock().ok()?;
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if now <= entry.expires_at => {
                entry.last_accessed = now;
                let data = entry.data.clone();
                inner.hits += 1;
                log::debug!("Cache hit: {}", key);
                return Some(data);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            inner.expired += 1;
            log::debug!("Cache entry expired: {}", key);
        }
        inner.misses += 1;
        log::debug!("Cache miss: {}", key);
        None
    }

    /// Store data with TTL, evicting the least recently used entry when full
    pub fn set(&self, key: &str, data: Value, ttl: Duration) {
        self.set_at(key, data, ttl, Utc::now());
    }

    fn set_at(&self, key: &str, data: Value, ttl: Duration, now: DateTime<Utc>) {
        let Ok(mut guard) = self.inner.lock() else {
            log::warn!("Response cache lock poisoned, not storing {}", key);
            return;
        };
        let inner = &mut *guard;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .values()
                .min_by_key(|e| (e.last_accessed, e.created_at))
                .map(|e| e.key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
                log::debug!("Cache evict (LRU): {}", oldest);
            }
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                data,
                expires_at,
                last_accessed: now,
                created_at: now,
            },
        );
    }

    /// Remove every entry, returning how many were removed
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        let count = inner.entries.len();
        inner.entries.clear();
        log::info!("Cleared {} response cache entries", count);
        Ok(count)
    }

    /// Remove every entry whose key matches, returning how many were removed
    pub fn clear_by_pattern(&self, matcher: &KeyMatcher) -> Result<usize, CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !matcher.matches(key));
        let removed = before - inner.entries.len();
        log::info!("Cleared {} response cache entries matching {:?}", removed, matcher);
        Ok(removed)
    }

    /// Drop all expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let before = inner.entries.len();
        inner.entries.retain(|_, e| now <= e.expires_at);
        let removed = before - inner.entries.len();
        inner.expired += removed as u64;
        if removed > 0 {
            log::debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        match self.inner.lock() {
            Ok(inner) => CacheStats {
                entries: inner.entries.len(),
                capacity: self.capacity,
                hits: inner.hits,
                misses: inner.misses,
                evictions: inner.evictions,
                expired: inner.expired,
            },
            Err(_) => CacheStats {
                capacity: self.capacity,
                ..CacheStats::default()
            },
        }
    }

    /// Start the periodic expiry sweep. Replaces any sweep already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let cache: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.upgrade() {
                            Some(cache) => {
                                cache.sweep_expired();
                            }
                            None => break,
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(previous) = sweeper.replace(SweepHandle {
                shutdown: shutdown_tx,
                task,
            })
        {
            let _ = previous.shutdown.send(());
        }
    }

    /// Stop the periodic sweep. Only for shutdown and test teardown.
    pub fn destroy(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(handle) = sweeper.take()
        {
            let _ = handle.shutdown.send(());
            log::debug!("Response cache sweeper stopped");
        }
    }

    /// Whether a background sweep is currently scheduled
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|s| s.as_ref().is_some_and(|h| !h.task.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        self.destroy();
    }
}
