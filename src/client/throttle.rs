//! Reactive outbound throttle for the upstream API
//!
//! Requests flow unthrottled until the upstream answers 429 once. From then on
//! every request waits on a governor quota for the rest of the process.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

/// Outbound pacing shared by every request of one client
pub struct UpstreamThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    per_minute: u32,
}

impl UpstreamThrottle {
    /// Create an inactive throttle allowing `per_minute` requests once active.
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            active: AtomicBool::new(false),
            per_minute: per_minute.get(),
        }
    }

    /// Activate pacing (called on 429).
    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            debug!(
                "Upstream throttling activated at {} requests/min",
                self.per_minute
            );
        }
    }

    /// Check if pacing is active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for permission if pacing is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for upstream throttle");
            self.limiter.until_ready().await;
        }
    }
}
