//! Knowledge of the specialized time-series provider.
//!
//! Marker keys, field naming conventions and URL tweaks live here so the
//! discovery and extraction passes stay provider-agnostic.

use crate::schema::{Field, TimeInterval, ValueType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Metadata marker. Its presence alone selects the time-series shape.
pub const META_DATA_KEY: &str = "Meta Data";

/// Series bucket keys in scan order. The first present key wins.
pub const TIME_SERIES_KEYS: [&str; 7] = [
    "Time Series (Daily)",
    "Weekly Time Series",
    "Monthly Time Series",
    "Time Series (5min)",
    "Time Series (15min)",
    "Time Series (30min)",
    "Time Series (60min)",
];

/// Hard provider error (malformed call, bad key).
pub const ERROR_MESSAGE_KEY: &str = "Error Message";

/// Rate-limit markers. Older responses use `Note`, newer ones `Information`.
pub const RATE_LIMIT_KEYS: [&str; 2] = ["Note", "Information"];

/// Path prefix recorded for fields read out of a series record.
pub const SERIES_PATH_PREFIX: &str = "timeSeries.";

/// Display key and marker path of the derived percent-change field.
pub const CHANGE_KEY: &str = "change";
pub const CHANGE_PATH: &str = "calculated.change";

pub const OHLCV_KEYS: [&str; 5] = ["open", "high", "low", "close", "volume"];

static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("ordinal prefix pattern is valid"));

/// Provider settings supplied by the service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Host fragment identifying provider endpoints.
    #[serde(default = "default_host")]
    pub host: String,
    /// Identifier injected into provider endpoints that lack one.
    #[serde(default = "default_symbol")]
    pub default_symbol: String,
}

fn default_host() -> String {
    "alphavantage.co".to_string()
}

fn default_symbol() -> String {
    "IBM".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            default_symbol: default_symbol(),
        }
    }
}

impl ProviderSettings {
    pub fn is_provider_endpoint(&self, endpoint: &str) -> bool {
        endpoint.contains(&self.host)
    }

    /// Append the default symbol to provider endpoints missing one.
    pub fn ensure_symbol<'a>(&self, endpoint: &'a str) -> Cow<'a, str> {
        if !self.is_provider_endpoint(endpoint) || endpoint.contains("symbol=") {
            return Cow::Borrowed(endpoint);
        }
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Cow::Owned(format!(
            "{}{}symbol={}",
            endpoint, separator, self.default_symbol
        ))
    }

    /// Rewrite an endpoint to request the series for `interval`, keeping its
    /// other query parameters (api key, output size). `None` for endpoints of
    /// other APIs.
    pub fn interval_endpoint(&self, endpoint: &str, interval: TimeInterval) -> Option<String> {
        if !self.is_provider_endpoint(endpoint) {
            return None;
        }
        let mut url = reqwest::Url::parse(endpoint).ok()?;
        let symbol = symbol_of(endpoint).unwrap_or_else(|| self.default_symbol.clone());
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "function" && k != "symbol")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("function", series_function(interval))
            .append_pair("symbol", &symbol);
        Some(url.to_string())
    }
}

/// Provider function name serving each interval.
pub fn series_function(interval: TimeInterval) -> &'static str {
    match interval {
        TimeInterval::Daily => "TIME_SERIES_DAILY",
        TimeInterval::Weekly => "TIME_SERIES_WEEKLY",
        TimeInterval::Monthly => "TIME_SERIES_MONTHLY",
    }
}

/// The `symbol` query parameter of an endpoint, if any.
pub fn symbol_of(endpoint: &str) -> Option<String> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "symbol")
        .map(|(_, v)| v.into_owned())
        .filter(|s| !s.is_empty())
}

/// `"1. open"` -> `"open"`.
pub fn strip_ordinal(key: &str) -> Cow<'_, str> {
    ORDINAL_PREFIX.replace(key, "")
}

pub fn field_description(key: &str) -> String {
    match key {
        "open" => "Opening price for the trading day".to_string(),
        "high" => "Highest price during the trading day".to_string(),
        "low" => "Lowest price during the trading day".to_string(),
        "close" => "Closing price for the trading day".to_string(),
        "volume" => "Number of shares traded".to_string(),
        CHANGE_KEY => "Price change percentage".to_string(),
        other => format!("{} data field", other),
    }
}

/// OHLCV field set for callers that never ran discovery.
pub fn default_ohlcv_fields() -> Vec<Field> {
    OHLCV_KEYS
        .iter()
        .enumerate()
        .map(|(i, key)| Field {
            key: key.to_string(),
            path: format!("{}{}. {}", SERIES_PATH_PREFIX, i + 1, key),
            value_type: ValueType::Number,
            sample: serde_json::json!(0),
            description: Some(field_description(key)),
        })
        .collect()
}
