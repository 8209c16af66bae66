//! Connection testing for the widget configuration flow.
//!
//! A dry run: one fetch, field discovery, nothing persisted.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::discovery::{discover_with_depth, DEFAULT_MAX_DEPTH};
use crate::error::ConnectionError;
use crate::provider::ProviderSettings;
use crate::schema::{ChartPoint, Field};
use crate::source::{check_provider_markers, DataSource};

/// Sample payload shown next to the field picker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleData {
    pub chart_data: Vec<ChartPoint>,
    pub raw_response: Value,
}

/// Result of a successful connection test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    /// The URL actually fetched, after any identifier injection.
    pub tested_url: String,
    pub fields: Vec<Field>,
    pub sample_data: SampleData,
}

#[derive(Clone)]
pub struct ConnectionTester {
    source: Arc<dyn DataSource>,
    provider: ProviderSettings,
    max_depth: usize,
}

impl ConnectionTester {
    pub fn new(source: Arc<dyn DataSource>, provider: ProviderSettings) -> Self {
        Self {
            source,
            provider,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Fetch `endpoint` once and discover its displayable fields.
    pub async fn test_connection(&self, endpoint: &str) -> Result<ConnectionReport, ConnectionError> {
        let url = self.provider.ensure_symbol(endpoint).into_owned();
        info!("Testing connection to {}", url);

        let result = self.run(&url).await;
        match &result {
            Ok(report) => info!(
                "Connection test ok: {} fields, {} sample points",
                report.fields.len(),
                report.sample_data.chart_data.len()
            ),
            Err(e) => warn!("Connection test failed for {}: {}", url, e),
        }
        result
    }

    async fn run(&self, url: &str) -> Result<ConnectionReport, ConnectionError> {
        let raw = self.source.fetch_json(url).await?;
        check_provider_markers(&raw)?;

        let discovery = discover_with_depth(&raw, self.max_depth)?;
        Ok(ConnectionReport {
            tested_url: url.to_string(),
            fields: discovery.fields,
            sample_data: SampleData {
                chart_data: discovery.chart_data,
                raw_response: raw,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiscoveryError, FetchError};
    use crate::source::testing::StubSource;
    use serde_json::json;

    const PROVIDER: &str = "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY&apikey=demo";

    fn tester(source: StubSource) -> (ConnectionTester, Arc<StubSource>) {
        let source = Arc::new(source);
        let tester = ConnectionTester::new(source.clone(), ProviderSettings::default());
        (tester, source)
    }

    #[tokio::test]
    async fn test_injects_symbol_for_provider_endpoints() {
        let url = format!("{}&symbol=IBM", PROVIDER);
        let body = json!({
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {"2024-01-02": {"1. open": "10", "4. close": "11"}}
        });
        let (tester, source) = tester(StubSource::new().with_json(&url, body.clone()));

        let report = tester.test_connection(PROVIDER).await.unwrap();
        assert_eq!(source.requests(), vec![url.clone()]);
        assert_eq!(report.tested_url, url);

        let keys: Vec<&str> = report.fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["open", "close", "change"]);
        assert_eq!(report.sample_data.chart_data.len(), 1);
        assert_eq!(report.sample_data.raw_response, body);
    }

    #[tokio::test]
    async fn test_generic_endpoint_is_fetched_verbatim() {
        let url = "https://api.example.com/v1/ticker?pair=BTCUSD";
        let (tester, source) = tester(StubSource::new().with_json(url, json!({"last": 42000})));

        let report = tester.test_connection(url).await.unwrap();
        assert_eq!(source.requests(), vec![url.to_string()]);
        assert_eq!(report.fields.len(), 1);
        assert!(report.sample_data.chart_data.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_typed() {
        let source = StubSource::new()
            .with_status("https://api.example.com/down", 503)
            .with_json("https://api.example.com/err", json!({"Error Message": "Invalid API call."}))
            .with_json("https://api.example.com/limit", json!({"Note": "Thank you for using our API"}))
            .with_json("https://api.example.com/empty", json!({"Time Series (Daily)": {}}));
        let (tester, _) = tester(source);

        let err = tester.test_connection("https://api.example.com/down").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Fetch(FetchError::Http { status: 503 })));

        let err = tester.test_connection("https://api.example.com/err").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Fetch(FetchError::Provider(_))));

        let err = tester.test_connection("https://api.example.com/limit").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Fetch(FetchError::RateLimited)));

        let err = tester.test_connection("https://api.example.com/empty").await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Discovery(DiscoveryError::NoTimeSeriesFound)
        ));
    }
}
