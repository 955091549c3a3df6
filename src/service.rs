//! Proxy request pipeline
//!
//! Every inbound request passes the session quota, then the response cache,
//! then either the bulk snapshot store or a direct upstream call. Successful
//! reads are stored back in the cache with their route's TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use rand::Rng;
use serde_json::Value;

use crate::cache::{self, KeyMatcher, ResponseCache, TtlTiers};
use crate::client::{RequestOptions, SportsApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::refresh::{BulkCacheRefresher, ScheduleHandle, schedule};
use crate::session::{RateLimitDecision, SessionRateLimiter};
use crate::store::SnapshotStore;

/// A request arriving from a client session
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub session_id: String,
    pub method: reqwest::Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl InboundRequest {
    pub fn new(session_id: &str, method: reqwest::Method, path: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(session_id: &str, path: &str) -> Self {
        Self::new(session_id, reqwest::Method::GET, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Where a served payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Snapshot,
    Upstream,
    /// Empty value for a bulk dataset that was never stored; never cached
    Placeholder,
}

/// Outcome of [`ProxyService::handle`]
#[derive(Debug, Clone)]
pub enum ServiceResponse {
    Data { data: Value, source: ResponseSource },
    RateLimited(RateLimitDecision),
}

#[derive(Debug, Clone, Default)]
struct Session {
    user_id: Option<String>,
    api_key: Option<String>,
}

/// Owns the cache, quotas, refresher and session table
pub struct ProxyService {
    api: Arc<dyn SportsApi>,
    cache: Arc<ResponseCache>,
    limiter: SessionRateLimiter,
    refresher: Arc<BulkCacheRefresher>,
    ttl: TtlTiers,
    sweep_interval: std::time::Duration,
    sessions: Mutex<HashMap<String, Session>>,
    scheduler: tokio::sync::Mutex<Option<ScheduleHandle>>,
}

impl ProxyService {
    pub fn new(config: &Config, api: Arc<dyn SportsApi>, store: SnapshotStore) -> Result<Self> {
        let refresher = BulkCacheRefresher::new(api.clone(), store, config.refresh.clone())?;

        Ok(Self {
            api,
            cache: Arc::new(ResponseCache::new(config.cache.capacity)),
            limiter: SessionRateLimiter::from_config(&config.rate_limit),
            refresher: Arc::new(refresher),
            ttl: config.cache.ttl.clone(),
            sweep_interval: config.cache.sweep_interval(),
            sessions: Mutex::new(HashMap::new()),
            scheduler: tokio::sync::Mutex::new(None),
        })
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn refresher(&self) -> &Arc<BulkCacheRefresher> {
        &self.refresher
    }

    /// Start the expiry sweep and the daily refresh schedule.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&self) {
        self.cache.start_sweeper(self.sweep_interval);

        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_none() {
            *scheduler = Some(schedule::spawn_scheduler(self.refresher.clone()));
        }
    }

    /// Stop background work. A refresh in flight finishes first.
    pub async fn shutdown(&self) {
        self.cache.destroy();
        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.stop().await;
        }
        info!("Proxy service stopped");
    }

    /// Open an anonymous session and return its id
    pub fn open_session(&self) -> String {
        let id = format!("{:016x}", rand::rng().random::<u64>());
        self.lock_sessions().insert(id.clone(), Session::default());
        debug!("Opened session {}", id);
        id
    }

    /// Attach a user to an open session. The session moves to the
    /// authenticated quota with a fresh window.
    pub fn authenticate_session(
        &self,
        session_id: &str,
        user_id: &str,
        api_key: Option<String>,
    ) -> Result<()> {
        {
            let mut sessions = self.lock_sessions();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
            session.user_id = Some(user_id.to_string());
            session.api_key = api_key;
        }
        self.limiter.set_authenticated(session_id, true);
        self.limiter.reset(session_id);
        info!("Session {} authenticated as {}", session_id, user_id);
        Ok(())
    }

    /// Forget a session and its quota state
    pub fn close_session(&self, session_id: &str) {
        self.lock_sessions().remove(session_id);
        self.limiter.remove(session_id);
        debug!("Closed session {}", session_id);
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self, session_id: &str) -> Option<Session> {
        self.lock_sessions().get(session_id).cloned()
    }

    /// Serve one request from an open session
    pub async fn handle(&self, request: InboundRequest) -> Result<ServiceResponse> {
        let session = self
            .session(&request.session_id)
            .ok_or_else(|| Error::UnknownSession(request.session_id.clone()))?;

        let decision = self.limiter.check(&request.session_id);
        if !decision.allowed {
            return Ok(ServiceResponse::RateLimited(decision));
        }

        let query: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let key = cache::fingerprint(
            &request.method,
            &request.path,
            &query,
            session.user_id.as_deref(),
        );

        let is_read = request.method == reqwest::Method::GET;
        if is_read && let Some(data) = self.cache.get(&key) {
            return Ok(ServiceResponse::Data {
                data,
                source: ResponseSource::Cache,
            });
        }

        let (data, source) = match self
            .refresher
            .dataset_for(&request.path, &request.query)
            .filter(|_| is_read)
        {
            Some(dataset) => match self.refresher.load_dataset(dataset).await? {
                Some(data) => (data, ResponseSource::Snapshot),
                None => {
                    return Ok(ServiceResponse::Data {
                        data: dataset.empty(),
                        source: ResponseSource::Placeholder,
                    });
                }
            },
            None => {
                let mut options = RequestOptions {
                    query: request.query.clone(),
                    body: request.body.clone(),
                    api_key: None,
                };
                if let Some(api_key) = session.api_key {
                    options = options.api_key(api_key);
                }
                let data = self
                    .api
                    .request(request.method.clone(), &request.path, options)
                    .await?;
                (data, ResponseSource::Upstream)
            }
        };

        if cache::is_cacheable(&request.method, &request.path, 200) {
            self.cache
                .set(&key, data.clone(), self.ttl.ttl_for_path(&request.path));
        }

        Ok(ServiceResponse::Data { data, source })
    }

    /// Drop cached responses whose key matches
    pub fn invalidate(&self, matcher: &KeyMatcher) -> Result<usize> {
        Ok(self.cache.clear_by_pattern(matcher)?)
    }
}
