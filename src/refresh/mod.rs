//! Bulk dataset refresher
//!
//! Fetches the full player and trending datasets, writes them to the snapshot
//! store and records when the last complete refresh happened. Runs on a daily
//! schedule, at startup when the data is stale, and on demand.
//!
//! Only one refresh runs per process at a time; triggers arriving while one is
//! in flight are dropped, not queued. The guard is process-local; several
//! instances sharing one store would need a lease row instead.

pub mod schedule;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{Value, json};

use crate::client::{RequestOptions, SportsApi};
use crate::config::RefreshConfig;
use crate::error::{Error, Result, StoreError};
use crate::store::{SnapshotInfo, SnapshotStore};

pub use schedule::{RefreshSchedule, ScheduleHandle};

/// Datasets kept as bulk snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    AllPlayers,
    TrendingAdd,
    TrendingDrop,
}

impl Dataset {
    /// Every tracked dataset, in refresh order
    pub const ALL: [Dataset; 3] = [Dataset::AllPlayers, Dataset::TrendingAdd, Dataset::TrendingDrop];

    pub fn id(&self) -> &'static str {
        match self {
            Dataset::AllPlayers => "all_players",
            Dataset::TrendingAdd => "trending_add",
            Dataset::TrendingDrop => "trending_drop",
        }
    }

    /// Value served when the dataset has never been populated
    pub fn empty(&self) -> Value {
        match self {
            Dataset::AllPlayers => json!({}),
            Dataset::TrendingAdd | Dataset::TrendingDrop => json!([]),
        }
    }

    /// Upstream path and query for fetching the full dataset
    pub fn request(&self, settings: &RefreshConfig) -> (String, RequestOptions) {
        match self {
            Dataset::AllPlayers => (format!("/players/{}", settings.sport), RequestOptions::new()),
            Dataset::TrendingAdd | Dataset::TrendingDrop => {
                let kind = if *self == Dataset::TrendingAdd { "add" } else { "drop" };
                (
                    format!("/players/{}/trending/{}", settings.sport, kind),
                    RequestOptions::new()
                        .query("lookback_hours", settings.trending_lookback_hours)
                        .query("limit", settings.trending_limit),
                )
            }
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.id() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Dataset::ALL.iter().map(|d| d.id()).collect();
                Error::Other(format!(
                    "Unknown dataset '{}'. Known datasets: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Result of a refresh trigger
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Every dataset was fetched and written
    Completed {
        refreshed_at: DateTime<Utc>,
        datasets: Vec<SnapshotInfo>,
    },
    /// Another refresh was already running; this trigger was dropped
    Skipped,
    /// The last refresh is recent enough; nothing was fetched
    Fresh { last_refresh: DateTime<Utc> },
}

/// Per-dataset entry of [`RefreshStatus`]
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub id: &'static str,
    pub size_bytes: Option<usize>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Snapshot of the refresher's state for reporting
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub last_refresh: Option<DateTime<Utc>>,
    pub is_refreshing: bool,
    pub datasets: Vec<DatasetStatus>,
    pub next_refresh: DateTime<Utc>,
    pub timezone: String,
}

/// Clears the refreshing flag on every exit path
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Keeps bulk dataset snapshots current
pub struct BulkCacheRefresher {
    api: Arc<dyn SportsApi>,
    store: Mutex<SnapshotStore>,
    settings: RefreshConfig,
    schedule: RefreshSchedule,
    refreshing: AtomicBool,
}

impl BulkCacheRefresher {
    pub fn new(api: Arc<dyn SportsApi>, store: SnapshotStore, settings: RefreshConfig) -> Result<Self> {
        let schedule = RefreshSchedule::from_config(&settings)?;
        Ok(Self {
            api,
            store: Mutex::new(store),
            settings,
            schedule,
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    pub fn settings(&self) -> &RefreshConfig {
        &self.settings
    }

    /// Dataset served for a request, if the request asks for one.
    ///
    /// Trending requests only match when their query is absent or equals the
    /// query the snapshot was fetched with.
    pub fn dataset_for(&self, path: &str, query: &[(String, String)]) -> Option<Dataset> {
        let path = path.strip_prefix("/v1").unwrap_or(path);
        let path = path.strip_suffix('/').unwrap_or(path);

        Dataset::ALL.into_iter().find(|dataset| {
            let (dataset_path, options) = dataset.request(&self.settings);
            if dataset_path != path {
                return false;
            }
            if query.is_empty() {
                return true;
            }
            let mut wanted = query.to_vec();
            let mut stored = options.query;
            wanted.sort();
            stored.sort();
            wanted == stored
        })
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    fn lock_store(&self) -> std::result::Result<MutexGuard<'_, SnapshotStore>, StoreError> {
        self.store.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Fetch every dataset and replace its snapshot.
    ///
    /// Snapshots are only written once every fetch has succeeded, and the
    /// refresh timestamp only after every snapshot is written. An error means
    /// the refresh did not advance.
    pub async fn refresh_all(&self) -> Result<RefreshOutcome> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            info!("Bulk refresh already in progress, dropping trigger");
            return Ok(RefreshOutcome::Skipped);
        };

        info!("Bulk refresh started");
        match self.run_refresh().await {
            Ok(outcome) => {
                if let RefreshOutcome::Completed { ref datasets, .. } = outcome {
                    let bytes: usize = datasets.iter().map(|d| d.size_bytes).sum();
                    info!(
                        "Bulk refresh succeeded: {} datasets, {} bytes",
                        datasets.len(),
                        bytes
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                error!("Bulk refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// On-demand refresh requested by a handler
    pub async fn force_refresh(&self) -> Result<RefreshOutcome> {
        self.refresh_all().await
    }

    async fn run_refresh(&self) -> Result<RefreshOutcome> {
        let fetches = Dataset::ALL.into_iter().map(|dataset| async move {
            let (path, options) = dataset.request(&self.settings);
            let payload = self
                .api
                .request(reqwest::Method::GET, &path, options)
                .await?;
            debug!("Fetched {}", dataset);
            Ok::<_, Error>((dataset, payload))
        });
        let fetched = try_join_all(fetches).await?;

        self.write_snapshots(&fetched)
    }

    fn write_snapshots(&self, fetched: &[(Dataset, Value)]) -> Result<RefreshOutcome> {
        let store = self.lock_store()?;

        let mut datasets = Vec::with_capacity(fetched.len());
        for (dataset, payload) in fetched {
            datasets.push(store.replace(dataset.id(), payload)?);
        }

        let refreshed_at = Utc::now();
        store.set_metadata(refreshed_at)?;

        Ok(RefreshOutcome::Completed {
            refreshed_at,
            datasets,
        })
    }

    /// Refresh when no refresh was ever recorded or the last one is at least
    /// one whole day old in the configured time zone. A metadata read error
    /// also triggers a refresh.
    pub async fn check_and_refresh_if_needed(&self) -> Result<RefreshOutcome> {
        let last = self.lock_store().and_then(|store| store.get_metadata());

        match last {
            Ok(None) => {
                info!("No previous bulk refresh recorded, refreshing now");
                self.refresh_all().await
            }
            Ok(Some(last_refresh)) => {
                let days = elapsed_days(last_refresh, Utc::now(), self.schedule.timezone());
                if days >= 1 {
                    info!("Bulk data is {} day(s) old, refreshing now", days);
                    self.refresh_all().await
                } else {
                    info!("Bulk data is current (last refresh {})", last_refresh);
                    Ok(RefreshOutcome::Fresh { last_refresh })
                }
            }
            Err(e) => {
                warn!("Could not read refresh metadata ({}), refreshing anyway", e);
                self.refresh_all().await
            }
        }
    }

    /// Stored payload for a dataset.
    ///
    /// A dataset that was never populated triggers one refresh; if it is still
    /// missing afterwards its empty value is returned. Store errors propagate.
    pub async fn get_dataset(&self, dataset: Dataset) -> Result<Value> {
        Ok(self
            .load_dataset(dataset)
            .await?
            .unwrap_or_else(|| dataset.empty()))
    }

    /// Like [`get_dataset`](Self::get_dataset), but `None` when nothing is
    /// stored even after the refresh attempt.
    pub async fn load_dataset(&self, dataset: Dataset) -> Result<Option<Value>> {
        if let Some(payload) = self.read_payload(dataset)? {
            return Ok(Some(payload));
        }

        info!("{} not yet populated, refreshing", dataset);
        if let Err(e) = self.refresh_all().await {
            warn!("Refresh for missing {} failed: {}", dataset, e);
        }

        let payload = self.read_payload(dataset)?;
        if payload.is_none() {
            warn!("{} still not populated", dataset);
        }
        Ok(payload)
    }

    fn read_payload(&self, dataset: Dataset) -> Result<Option<Value>> {
        let store = self.lock_store()?;
        Ok(store.get(dataset.id())?.map(|s| s.payload))
    }

    /// Current refresh state, dataset sizes and next scheduled run
    pub fn get_status(&self) -> Result<RefreshStatus> {
        let (last_refresh, stored) = {
            let store = self.lock_store()?;
            (store.get_metadata()?, store.list()?)
        };

        let datasets = Dataset::ALL
            .iter()
            .map(|dataset| {
                let info = stored.iter().find(|s| s.id == dataset.id());
                DatasetStatus {
                    id: dataset.id(),
                    size_bytes: info.map(|i| i.size_bytes),
                    updated_at: info.map(|i| i.updated_at),
                }
            })
            .collect();

        Ok(RefreshStatus {
            last_refresh,
            is_refreshing: self.is_refreshing(),
            datasets,
            next_refresh: self.schedule.next_after(Utc::now()),
            timezone: self.schedule.timezone().name().to_string(),
        })
    }
}

/// Whole days between two instants measured on the wall clock of `tz`
pub fn elapsed_days(last: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> i64 {
    let last = last.with_timezone(&tz).naive_local();
    let now = now.with_timezone(&tz).naive_local();
    (now - last).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockSportsApi;
    use crate::error::ApiError;
    use std::time::Duration;
    use tempfile::TempDir;

    const PLAYERS: &str = "/players/nfl";
    const ADDS: &str = "/players/nfl/trending/add";
    const DROPS: &str = "/players/nfl/trending/drop";

    async fn seeded_mock() -> MockSportsApi {
        MockSportsApi::new()
            .with_response(PLAYERS, json!({"4046": {"full_name": "Patrick Mahomes"}}))
            .await
            .with_response(ADDS, json!([{"player_id": "4046", "count": 900}]))
            .await
            .with_response(DROPS, json!([{"player_id": "1234", "count": 12}]))
            .await
    }

    fn refresher(mock: Arc<MockSportsApi>) -> (BulkCacheRefresher, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open_at(dir.path()).unwrap();
        let refresher = BulkCacheRefresher::new(mock, store, RefreshConfig::default()).unwrap();
        (refresher, dir)
    }

    #[test]
    fn test_dataset_ids_round_trip() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.id().parse::<Dataset>().unwrap(), dataset);
        }
        assert!("nope".parse::<Dataset>().is_err());
    }

    #[test]
    fn test_dataset_requests() {
        let settings = RefreshConfig::default();
        let (path, opts) = Dataset::TrendingDrop.request(&settings);
        assert_eq!(path, DROPS);
        assert!(opts.query.contains(&("limit".to_string(), "25".to_string())));
        assert_eq!(Dataset::AllPlayers.request(&settings).0, PLAYERS);
    }

    #[test]
    fn test_dataset_for_routes() {
        let (refresher, _dir) = refresher(Arc::new(MockSportsApi::new()));
        assert_eq!(refresher.dataset_for("/players/nfl", &[]), Some(Dataset::AllPlayers));
        assert_eq!(refresher.dataset_for("/v1/players/nfl/", &[]), Some(Dataset::AllPlayers));
        assert_eq!(refresher.dataset_for("/players/nba", &[]), None);

        let matching = vec![
            ("limit".to_string(), "25".to_string()),
            ("lookback_hours".to_string(), "24".to_string()),
        ];
        assert_eq!(
            refresher.dataset_for(ADDS, &matching),
            Some(Dataset::TrendingAdd)
        );
        let other = vec![("limit".to_string(), "5".to_string())];
        assert_eq!(refresher.dataset_for(ADDS, &other), None);
        assert_eq!(refresher.dataset_for("/league/1", &[]), None);
    }

    #[tokio::test]
    async fn test_refresh_all_writes_every_dataset() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());

        let outcome = refresher.refresh_all().await.unwrap();
        match outcome {
            RefreshOutcome::Completed { datasets, .. } => assert_eq!(datasets.len(), 3),
            other => panic!("Expected Completed, got {:?}", other),
        }

        let status = refresher.get_status().unwrap();
        assert!(status.last_refresh.is_some());
        assert!(!status.is_refreshing);
        assert!(status.datasets.iter().all(|d| d.size_bytes.is_some()));
        assert!(status.next_refresh > Utc::now());
        assert_eq!(mock.total_calls().await, 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_previous_state() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());

        refresher.refresh_all().await.unwrap();
        let before = refresher.get_status().unwrap();

        mock.push_response(PLAYERS, json!({"9999": {}})).await;
        mock.push_error(DROPS, ApiError::Unavailable { status: 503 }).await;

        let err = refresher.refresh_all().await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert!(!refresher.is_refreshing());

        let after = refresher.get_status().unwrap();
        assert_eq!(after.last_refresh, before.last_refresh);
        assert_eq!(
            refresher.get_dataset(Dataset::AllPlayers).await.unwrap(),
            json!({"4046": {"full_name": "Patrick Mahomes"}})
        );
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_skipped() {
        let mock = Arc::new(seeded_mock().await.with_delay(Duration::from_millis(50)));
        let (refresher, _dir) = refresher(mock.clone());

        let (first, second) = tokio::join!(refresher.refresh_all(), refresher.refresh_all());
        let outcomes = [first.unwrap(), second.unwrap()];

        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, RefreshOutcome::Skipped))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(mock.calls(PLAYERS).await, 1);
        assert_eq!(mock.calls(ADDS).await, 1);
        assert_eq!(mock.calls(DROPS).await, 1);
        assert!(!refresher.is_refreshing());
    }

    #[tokio::test]
    async fn test_second_refresh_replaces_snapshot() {
        let mock = Arc::new(
            MockSportsApi::new()
                .with_response(PLAYERS, json!({"old": {}}))
                .await
                .with_response(PLAYERS, json!({"new": {}}))
                .await
                .with_response(ADDS, json!([]))
                .await
                .with_response(DROPS, json!([]))
                .await,
        );
        let (refresher, _dir) = refresher(mock);

        refresher.refresh_all().await.unwrap();
        refresher.refresh_all().await.unwrap();

        let players = refresher.get_dataset(Dataset::AllPlayers).await.unwrap();
        assert_eq!(players, json!({"new": {}}));
        assert_eq!(refresher.lock_store().unwrap().list().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_dataset_populates_on_miss() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());

        let adds = refresher.get_dataset(Dataset::TrendingAdd).await.unwrap();
        assert_eq!(adds, json!([{"player_id": "4046", "count": 900}]));

        // Served from the store now
        refresher.get_dataset(Dataset::TrendingAdd).await.unwrap();
        assert_eq!(mock.calls(ADDS).await, 1);
    }

    #[tokio::test]
    async fn test_load_dataset_none_when_never_populated() {
        let mock = Arc::new(
            MockSportsApi::new()
                .with_error(PLAYERS, ApiError::Unavailable { status: 503 })
                .await,
        );
        let (refresher, _dir) = refresher(mock);

        assert_eq!(refresher.load_dataset(Dataset::AllPlayers).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_dataset_empty_when_never_populated() {
        let mock = Arc::new(
            MockSportsApi::new()
                .with_error(PLAYERS, ApiError::Network("Failed to connect to API".into()))
                .await,
        );
        let (refresher, _dir) = refresher(mock);

        assert_eq!(
            refresher.get_dataset(Dataset::AllPlayers).await.unwrap(),
            json!({})
        );
        assert_eq!(
            refresher.get_dataset(Dataset::TrendingDrop).await.unwrap(),
            json!([])
        );
    }

    #[tokio::test]
    async fn test_startup_check_refreshes_when_never_run() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());

        let outcome = refresher.check_and_refresh_if_needed().await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Completed { .. }));
        assert_eq!(mock.total_calls().await, 3);
    }

    #[tokio::test]
    async fn test_startup_check_skips_recent_refresh() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());
        refresher
            .lock_store()
            .unwrap()
            .set_metadata(Utc::now() - chrono::Duration::hours(3))
            .unwrap();

        let outcome = refresher.check_and_refresh_if_needed().await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Fresh { .. }));
        assert_eq!(mock.total_calls().await, 0);
    }

    #[tokio::test]
    async fn test_startup_check_refreshes_stale_data() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());
        refresher
            .lock_store()
            .unwrap()
            .set_metadata(Utc::now() - chrono::Duration::days(2))
            .unwrap();

        let outcome = refresher.check_and_refresh_if_needed().await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_startup_check_fails_open_on_metadata_error() {
        let mock = Arc::new(seeded_mock().await);
        let (refresher, _dir) = refresher(mock.clone());
        refresher
            .lock_store()
            .unwrap()
            .connection()
            .execute_batch("DROP TABLE refresh_metadata")
            .unwrap();

        // The refresh is attempted; writing the metadata then fails
        let result = refresher.check_and_refresh_if_needed().await;
        assert!(result.is_err());
        assert_eq!(mock.total_calls().await, 3);
    }

    #[test]
    fn test_elapsed_days_uses_wall_clock() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let last = DateTime::parse_from_rfc3339("2024-03-09T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        // 23 real hours across the spring-forward change is a full local day
        let now = last + chrono::Duration::hours(23);
        assert_eq!(elapsed_days(last, now, tz), 1);

        let now = last + chrono::Duration::hours(20);
        assert_eq!(elapsed_days(last, now, tz), 0);
    }
}
