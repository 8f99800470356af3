//! HTTP client for the OpenAI-compatible REST API.
//!
//! Shared by the embedder and the chat model. Every request goes through the
//! client's [`RetryPolicy`]:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Unparseable success bodies → fail immediately

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::retry::{RetryError, RetryPolicy};

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 500;

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY environment variable is required"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.base_delay_ms),
            ),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `{base_url}/{path}` and return the parsed JSON reply.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.retry
            .run(path, |attempt| {
                let url = url.clone();
                async move {
                    debug!(%url, attempt, "POST");
                    self.send_once(&url, body).await
                }
            })
            .await
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<Value, RetryError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RetryError::Transient(anyhow!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| RetryError::Permanent(anyhow!("invalid JSON response: {}", e)));
        }

        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        let err = anyhow!("OpenAI API error {}: {}", status, text);
        if is_transient(status) {
            Err(RetryError::Transient(err))
        } else {
            Err(RetryError::Permanent(err))
        }
    }
}

pub fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
