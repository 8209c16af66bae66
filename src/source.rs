//! Outbound JSON fetching.
//!
//! [`DataSource`] is the single seam through which the dashboard reaches the
//! network, so connection tests and refreshes can run against any backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::provider::{ERROR_MESSAGE_KEY, RATE_LIMIT_KEYS};
use crate::shape::is_truthy;

/// Async trait implemented by every way of fetching an endpoint.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// GET `url` and parse the body as JSON. Non-2xx statuses are errors.
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// reqwest-backed source used by the running service.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl DataSource for HttpSource {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::InvalidBody(e.to_string()))
    }
}

/// Reject bodies carrying the provider's error or rate-limit markers.
pub fn check_provider_markers(body: &Value) -> Result<(), FetchError> {
    let Some(obj) = body.as_object() else {
        return Ok(());
    };

    if let Some(message) = obj.get(ERROR_MESSAGE_KEY).filter(|v| is_truthy(v)) {
        let message = match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(FetchError::Provider(message));
    }

    let rate_limited = RATE_LIMIT_KEYS
        .iter()
        .any(|key| obj.get(*key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()));
    if rate_limited {
        return Err(FetchError::RateLimited);
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/quote", get(|| async { Json(json!({"price": 1.5})) }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/html", get(|| async { "<html></html>" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_source_statuses_and_bodies() {
        let base = spawn_server().await;
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();

        let body = source.fetch_json(&format!("{}/quote", base)).await.unwrap();
        assert_eq!(body, json!({"price": 1.5}));

        let err = source.fetch_json(&format!("{}/broken", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 500 }));

        let err = source.fetch_json(&format!("{}/html", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidBody(_)));
    }

    #[test]
    fn test_provider_markers() {
        let err = check_provider_markers(&json!({"Error Message": "Invalid API call."})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid API call.");

        let err = check_provider_markers(&json!({"Note": "Thank you for using our API"})).unwrap_err();
        assert!(matches!(err, FetchError::RateLimited));

        let err = check_provider_markers(&json!({"Information": "premium endpoint"})).unwrap_err();
        assert!(err.is_retryable());

        assert!(check_provider_markers(&json!({"price": 1})).is_ok());
        assert!(check_provider_markers(&json!({"Error Message": "", "price": 1})).is_ok());
        assert!(check_provider_markers(&json!({"Error Message": false})).is_ok());
        assert!(check_provider_markers(&json!({"Error Message": null})).is_ok());
        let err = check_provider_markers(&json!({"Error Message": {"code": 7}})).unwrap_err();
        assert!(matches!(err, FetchError::Provider(_)));
        assert!(check_provider_markers(&json!({"Note": {"nested": true}})).is_ok());
        assert!(check_provider_markers(&json!([1, 2])).is_ok());
    }
}
