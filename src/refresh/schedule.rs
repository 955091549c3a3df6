//! Daily refresh schedule
//!
//! Fires once per day at a fixed wall-clock time in a named time zone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{debug, error, info};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{BulkCacheRefresher, RefreshOutcome};
use crate::config::RefreshConfig;
use crate::error::Result;

/// Wall-clock time of day in a time zone
#[derive(Debug, Clone, Copy)]
pub struct RefreshSchedule {
    time_of_day: NaiveTime,
    tz: Tz,
}

impl RefreshSchedule {
    pub fn new(time_of_day: NaiveTime, tz: Tz) -> Self {
        Self { time_of_day, tz }
    }

    pub fn from_config(config: &RefreshConfig) -> Result<Self> {
        Ok(Self::new(config.time_of_day()?, config.timezone()?))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// First scheduled instant strictly after `now`.
    ///
    /// A time skipped by a DST change fires one hour later; a repeated time
    /// fires on its first occurrence.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();

        for offset in 0..=2 {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            let local = date.and_time(self.time_of_day);
            let resolved = match self.tz.from_local_datetime(&local) {
                LocalResult::None => self
                    .tz
                    .from_local_datetime(&(local + chrono::Duration::hours(1)))
                    .earliest(),
                other => other.earliest(),
            };
            if let Some(at) = resolved.map(|dt| dt.with_timezone(&Utc))
                && at > now
            {
                return at;
            }
        }

        now + chrono::Duration::days(1)
    }
}

/// Stops the scheduler task when told to
pub struct ScheduleHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Stop scheduling. A refresh already running is allowed to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Refresh scheduler task failed: {}", e);
        }
    }
}

/// Run `refresh_all` at every scheduled time until stopped.
///
/// Failures are logged; the next day's run is still scheduled.
pub fn spawn_scheduler(refresher: Arc<BulkCacheRefresher>) -> ScheduleHandle {
    let (shutdown, mut shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = refresher.schedule().next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(
                "Next bulk refresh at {}",
                next.with_timezone(&refresher.schedule().timezone())
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    match refresher.refresh_all().await {
                        Ok(RefreshOutcome::Skipped) => debug!("Scheduled refresh skipped"),
                        Ok(_) => info!("Scheduled refresh finished"),
                        Err(e) => error!("Scheduled refresh failed: {}", e),
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("Refresh scheduler stopped");
                    break;
                }
            }
        }
    });

    ScheduleHandle { shutdown, task }
}
