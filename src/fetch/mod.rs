//! Source fetching: HTTP JSON endpoints and browser-rendered pages

pub mod browser;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::USER_AGENT;
use crate::error::HarvestError;

/// Build the shared HTTP client used for fetching, downloading and enrichment.
pub fn build_client(timeout: Duration) -> Result<Client, HarvestError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| HarvestError::InvalidConfig(format!("failed to create HTTP client: {e}")))
}

/// Fetches search/collection endpoints that answer with JSON
#[derive(Clone)]
pub struct JsonFetcher {
    client: Client,
}

impl JsonFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issue one GET and parse the body as JSON.
    ///
    /// Transport errors, timeouts, non-2xx statuses and malformed bodies all
    /// surface as [`HarvestError::FetchFailed`].
    pub async fn get_json(&self, url: &str) -> Result<Value, HarvestError> {
        info!("Fetching {}", url);

        let fetch_failed = |reason: String| HarvestError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                fetch_failed("request timed out".to_string())
            } else {
                fetch_failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(fetch_failed(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        debug!("Received {} bytes from {}", body.len(), url);

        serde_json::from_str(&body).map_err(|e| fetch_failed(format!("invalid JSON: {e}")))
    }

    /// Fetch several endpoints in order. Any failure aborts the whole batch.
    pub async fn get_all(&self, urls: &[String]) -> Result<Vec<Value>, HarvestError> {
        let mut bodies = Vec::with_capacity(urls.len());
        for url in urls {
            bodies.push(self.get_json(url).await?);
        }
        Ok(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubResponse, serve};

    fn fetcher() -> JsonFetcher {
        JsonFetcher::new(build_client(Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn parses_json_body() {
        let base = serve(vec![(
            "/search",
            StubResponse::json(200, r#"{"response":{"docs":[]}}"#),
        )])
        .await;

        let value = fetcher().get_json(&format!("{base}/search?q=mug")).await.unwrap();
        assert!(value["response"]["docs"].is_array());
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_failure() {
        let base = serve(vec![("/search", StubResponse::json(503, "{}"))]).await;

        let err = fetcher().get_json(&format!("{base}/search")).await.unwrap_err();
        match err {
            HarvestError::FetchFailed { reason, .. } => assert!(reason.contains("503"), "got: {reason}"),
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_fetch_failure() {
        let base = serve(vec![("/search", StubResponse::json(200, "<html>"))]).await;

        let err = fetcher().get_json(&format!("{base}/search")).await.unwrap_err();
        assert!(matches!(err, HarvestError::FetchFailed { ref reason, .. } if reason.starts_with("invalid JSON")));
    }

    #[tokio::test]
    async fn get_all_stops_at_first_failure() {
        let base = serve(vec![("/a", StubResponse::json(200, "{}"))]).await;
        let urls = vec![format!("{base}/a"), format!("{base}/missing")];

        assert!(fetcher().get_all(&urls).await.is_err());
    }
}
