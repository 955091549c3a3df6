//! Mock sports data API for testing
//!
//! Provides a scripted implementation of [`SportsApi`] for unit testing
//! without making real API calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{RequestOptions, SportsApi};
use crate::error::{ApiError, Result};

/// Mock API client for testing.
///
/// Configure responses per path via builder methods, then use in tests.
///
/// # Example
/// ```ignore
/// let mock = MockSportsApi::new()
///     .with_response("/players/nfl", json!({"4046": {"full_name": "Patrick Mahomes"}}))
///     .await;
///
/// let players = mock.request(Method::GET, "/players/nfl", RequestOptions::new()).await?;
/// ```
#[derive(Default)]
pub struct MockSportsApi {
    /// Responses keyed by path; a path with several queued values serves
    /// them in order and keeps repeating the last one
    responses: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
    /// Errors keyed by path, each consumed on use before any response
    errors: Arc<Mutex<HashMap<String, VecDeque<ApiError>>>>,
    /// Calls per path for verification
    calls: Arc<Mutex<HashMap<String, usize>>>,
    /// Captured requests for test assertions
    captured_requests: Arc<Mutex<Vec<CapturedRequest>>>,
    /// Artificial latency applied to every call
    delay: Option<Duration>,
}

/// A captured API request for test assertions.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub api_key: Option<String>,
}

impl MockSportsApi {
    /// Create a new mock client with no configured responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a path.
    pub async fn with_response(self, path: &str, value: Value) -> Self {
        self.responses
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(value);
        self
    }

    /// Queue an error for the next call to a path.
    pub async fn with_error(self, path: &str, error: ApiError) -> Self {
        self.errors
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Delay every call, to hold requests in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an error at runtime (after construction).
    pub async fn push_error(&self, path: &str, error: ApiError) {
        self.errors
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(error);
    }

    /// Queue a response at runtime (after construction).
    pub async fn push_response(&self, path: &str, value: Value) {
        self.responses
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(value);
    }

    /// Number of calls made to a path.
    pub async fn calls(&self, path: &str) -> usize {
        self.calls.lock().await.get(path).copied().unwrap_or(0)
    }

    /// Total number of calls across all paths.
    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }

    /// Get all captured requests.
    pub async fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.captured_requests.lock().await.clone()
    }
}

#[async_trait]
impl SportsApi for MockSportsApi {
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value> {
        *self.calls.lock().await.entry(path.to_string()).or_default() += 1;
        self.captured_requests.lock().await.push(CapturedRequest {
            method,
            path: path.to_string(),
            query: options.query,
            api_key: options.api_key,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self
            .errors
            .lock()
            .await
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error.into());
        }

        let mut responses = self.responses.lock().await;
        match responses.get_mut(path) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap_or_default()),
            Some(queue) => Ok(queue.front().cloned().unwrap_or_default()),
            None => Err(ApiError::NotFound(path.to_string()).into()),
        }
    }
}
