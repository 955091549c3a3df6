//! Error types for Courtside

use thiserror::Error;

/// Result type alias for Courtside operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown session '{0}'. Open a session before sending requests.")]
    UnknownSession(String),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Upstream API errors.
///
/// The `Display` text is the message shown to end users, chosen by status
/// bucket. Use [`ApiError::status`] for retry decisions.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request sent to the sports data API: {0}")]
    BadRequest(String),

    #[error("Requested data was not found: {0}")]
    NotFound(String),

    #[error("The sports data API is rate limiting requests. Please try again shortly.")]
    RateLimited,

    #[error("The sports data API is currently unavailable (HTTP {status}). Please try again later.")]
    Unavailable { status: u16 },

    #[error("Unable to reach the sports data API: {0}")]
    Network(String),

    #[error("Request to the sports data API failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map a non-success HTTP status to its user-facing bucket.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => ApiError::BadRequest(body),
            404 => ApiError::NotFound(body),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Unavailable { status },
            _ => ApiError::Http {
                status,
                message: if body.is_empty() {
                    "Unexpected response".to_string()
                } else {
                    body
                },
            },
        }
    }

    /// HTTP status that produced this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest(_) => Some(400),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::Unavailable { status } | ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(_) | ApiError::InvalidResponse(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Persistent snapshot store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not determine a data directory")]
    NoHome,

    #[error("Snapshot store I/O error: {0}")]
    Io(String),

    #[error("Snapshot store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Snapshot '{0}' is corrupt: {1}")]
    Corrupt(String, String),

    #[error("Snapshot store lock poisoned")]
    Poisoned,
}

/// In-memory response cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Response cache lock poisoned, cannot enumerate keys")]
    Poisoned,
}
