//! Search backend client.
//!
//! Thin HTTP wrapper around the records search service. Invalid params are
//! rejected before anything touches the wire; 4xx responses propagate
//! immediately while 5xx/network/timeout failures are retried on a fixed
//! backoff schedule.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::action::SearchActionParams;
use crate::config::SearchConfig;
use crate::error::{EngineError, Result};
use crate::types::SearchResponse;

/// Seam between the engine and the records backend, so orchestration logic
/// can run against a canned backend in tests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, params: &SearchActionParams) -> Result<SearchResponse>;
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn search(&self, params: &SearchActionParams) -> Result<SearchResponse> {
        self.execute(params).await
    }
}

pub struct SearchClient {
    config: SearchConfig,
    client: Client,
}

impl SearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Execute a validated search action.
    ///
    /// Attempts are strictly sequential: one initial try plus one per entry
    /// in `retry_delays_secs`, sleeping the corresponding delay first.
    pub async fn execute(&self, params: &SearchActionParams) -> Result<SearchResponse> {
        // Invalid params never reach the backend.
        params
            .validate()
            .map_err(|errors| EngineError::Validation(errors.join("; ")))?;

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let query = self.query_pairs(params);

        let mut last_error = EngineError::transport("search not attempted");
        for attempt in 0..=self.config.retry_delays_secs.len() {
            if attempt > 0 {
                let delay = self.config.retry_delays_secs[attempt - 1];
                tracing::warn!(attempt, delay_secs = delay, error = %last_error, "search failed, retrying");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            match self.try_once(&url, &query).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn try_once(&self, url: &str, query: &[(String, String)]) -> Result<SearchResponse> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::transport(format!("search request to {} timed out", url))
                } else {
                    EngineError::transport(format!("search request to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EngineError::transport(format!("failed to read search response body: {}", e))
        })?;

        if status.is_client_error() {
            // The backend rejected the request shape; retrying cannot help.
            let preview: String = body.chars().take(200).collect();
            return Err(EngineError::Validation(format!(
                "search backend rejected the request (HTTP {}): {}",
                status, preview
            )));
        }
        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(EngineError::transport_with_status(
                format!("search backend returned HTTP {}: {}", status, preview),
                status.as_u16(),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            EngineError::Parse(format!(
                "search response was not valid JSON: {}. Body: {}",
                e, preview
            ))
        })
    }

    /// Lightweight availability probe against the backend's health route.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.health_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn query_pairs(&self, params: &SearchActionParams) -> Vec<(String, String)> {
        let mut pairs = vec![("q".to_string(), params.q.clone())];
        let mut push_opt = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                pairs.push((key.to_string(), v));
            }
        };
        push_opt("type", params.content_type.clone());
        push_opt("speaker", params.speaker.clone());
        push_opt("committee", params.committee.clone());
        push_opt("chamber", params.chamber.clone());
        push_opt("congress", params.congress.map(|c| c.to_string()));
        push_opt("from", params.from.clone());
        push_opt("to", params.to.clone());
        push_opt("limit", params.limit.map(|l| l.to_string()));
        push_opt("offset", params.offset.map(|o| o.to_string()));
        push_opt(
            "exclude_witnesses",
            params.exclude_witnesses.map(|b| b.to_string()),
        );
        push_opt("context", params.context.map(|c| c.to_string()));
        // Enrichment is the caller's call, never the model's.
        pairs.push(("enrich".to_string(), self.config.enrich.to_string()));
        pairs
    }
}
