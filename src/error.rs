//! Error taxonomy for discovery, fetching, extraction and import.

use thiserror::Error;

/// Raised by field discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The response carries a time-series marker but no usable timestamp entries.
    #[error("No time series data found in API response")]
    NoTimeSeriesFound,
}

/// Raised by the outbound call to a widget or connection endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: status {status}")]
    Http { status: u16 },
    /// Provider-level error marker in an otherwise successful response.
    #[error("{0}")]
    Provider(String),
    #[error("API call frequency limit reached. Please try again later.")]
    RateLimited,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(String),
}

impl FetchError {
    /// Rate limits clear on their own; everything else needs the endpoint fixed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Raised by the connection tester.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Raised by a widget refresh. Per-field misses never surface here.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Raised by dashboard import. The import is rejected as a whole.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid dashboard JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("dashboard JSON has no widgets array")]
    MissingWidgets,
}
