//! Per-session request quotas
//!
//! Fixed-window counters keyed by session id. Authenticated sessions get a
//! larger quota than anonymous ones. Windows are created on first use.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;

use crate::config::RateLimitConfig;

/// Outcome of a quota check. Exceeding the quota is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    pub limit: u32,
    /// Time until the window resets; set when the request was rejected
    pub reset_in: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, Default)]
struct LimiterState {
    windows: HashMap<String, Window>,
    authenticated: HashSet<String>,
}

/// Fixed-window rate limiter keyed by session id
#[derive(Debug)]
pub struct SessionRateLimiter {
    state: Mutex<LimiterState>,
    authenticated_limit: u32,
    anonymous_limit: u32,
    window: Duration,
}

impl SessionRateLimiter {
    pub fn new(authenticated_limit: u32, anonymous_limit: u32, window: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            authenticated_limit,
            anonymous_limit,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.authenticated,
            config.anonymous,
            Duration::from_millis(config.window_ms),
        )
    }

    /// Count a request against the session's quota
    pub fn check(&self, session_id: &str) -> RateLimitDecision {
        self.check_at(session_id, Instant::now())
    }

    fn check_at(&self, session_id: &str, now: Instant) -> RateLimitDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let limit = if state.authenticated.contains(session_id) {
            self.authenticated_limit
        } else {
            self.anonymous_limit
        };

        let window = state
            .windows
            .entry(session_id.to_string())
            .or_insert(Window {
                count: 0,
                started: now,
            });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed > self.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= limit {
            let reset_in = self
                .window
                .saturating_sub(now.saturating_duration_since(window.started));
            warn!(
                "Rate limit exceeded for session {} ({}/{}), resets in {:?}",
                session_id, window.count, limit, reset_in
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit,
                reset_in: Some(reset_in),
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - window.count,
            limit,
            reset_in: None,
        }
    }

    /// Forget the session's window; the next request starts a new one
    pub fn reset(&self, session_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.windows.remove(session_id);
    }

    /// Switch the session between the authenticated and anonymous quota
    pub fn set_authenticated(&self, session_id: &str, authenticated: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if authenticated {
            state.authenticated.insert(session_id.to_string());
        } else {
            state.authenticated.remove(session_id);
        }
        debug!(
            "Session {} now uses the {} quota",
            session_id,
            if authenticated { "authenticated" } else { "anonymous" }
        );
    }

    /// Drop all state for a closed session
    pub fn remove(&self, session_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.windows.remove(session_id);
        state.authenticated.remove(session_id);
    }

    /// Sessions with an open window
    pub fn tracked_sessions(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.windows.len())
            .unwrap_or_else(|e| e.into_inner().windows.len())
    }
}
