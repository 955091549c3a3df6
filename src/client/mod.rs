//! Sports data API client

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[cfg(test)]
pub mod mock;
pub mod retry;
pub mod throttle;
pub mod upstream;

#[cfg(test)]
pub use mock::MockSportsApi;
pub use retry::RetryPolicy;
pub use upstream::UpstreamClient;

/// Per-call options for an upstream request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query string parameters
    pub query: Vec<(String, String)>,

    /// JSON body for PUT/POST
    pub body: Option<Value>,

    /// API key supplied by the caller, sent as `x-api-key`
    pub api_key: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Sports data API trait
#[async_trait]
pub trait SportsApi: Send + Sync {
    /// Issue a request and return the decoded JSON body.
    ///
    /// `path` is relative to the configured base URL (e.g. `/players/nfl`).
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value>;
}
