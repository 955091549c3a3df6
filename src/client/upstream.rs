//! Sports data API client implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use super::retry::{RetryPolicy, with_retry};
use super::throttle::UpstreamThrottle;
use super::{RequestOptions, SportsApi};
use crate::config::UpstreamConfig;
use crate::error::{ApiError, Result};

/// Header carrying a caller-supplied API key
const API_KEY_HEADER: &str = "x-api-key";

/// Retrying HTTP client for the upstream sports data API
pub struct UpstreamClient {
    http: HttpClient,
    base_url: String,
    retry: RetryPolicy,
    throttle: UpstreamThrottle,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(config: &UpstreamConfig, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ApiError::InvalidResponse(format!("Invalid user agent: {}", e)))?,
        );

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry,
            throttle: UpstreamThrottle::new(config.requests_per_minute),
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single attempt, no retry
    async fn send_once(
        &self,
        method: reqwest::Method,
        path: &str,
        options: &RequestOptions,
    ) -> std::result::Result<Value, ApiError> {
        self.throttle.wait_if_active().await;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).query(&options.query);
        if let Some(ref key) = options.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to read response: {}", e)))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.throttle.activate();
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), body))
    }
}

#[async_trait]
impl SportsApi for UpstreamClient {
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value> {
        let label = format!("{} {}", method, path);
        log::debug!("Upstream request: {}", label);

        let value = with_retry(&self.retry, &label, || {
            self.send_once(method.clone(), path, &options)
        })
        .await?;
        Ok(value)
    }
}
