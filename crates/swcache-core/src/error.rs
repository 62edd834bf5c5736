use thiserror::Error;

use crate::worker::LifecycleState;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Failed to (de)serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Response body already consumed")]
    BodyConsumed,

    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid lifecycle transition: expected {expected:?}, worker is {actual:?}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("Cache bucket no longer exists: {0}")]
    BucketMissing(String),

    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),
}

/// Maximum length for URLs echoed back in error messages
const MAX_URL_LENGTH: usize = 200;

impl CacheError {
    /// Truncate a URL to avoid logging excessively long query strings
    pub fn truncate_url(url: &str) -> String {
        if url.len() <= MAX_URL_LENGTH {
            url.to_string()
        } else {
            let cut = (0..=MAX_URL_LENGTH)
                .rev()
                .find(|&i| url.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &url[..cut], url.len())
        }
    }

    /// Whether the failure came from the network rather than local storage.
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Network(_) | CacheError::HttpStatus(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
