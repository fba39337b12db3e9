//! Remote analyzer speaking the `{score, flags, confidence?, extras?}` contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::json;

use crate::config::HttpProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::ModerationProvider;
use crate::error::{ModerationError, ModerationResult, ProviderError};

/// Posts text as `{"text": ...}` and media as raw octet-stream bytes.
pub struct HttpProvider {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

impl HttpProvider {
    pub fn new(config: &HttpProviderConfig, timeout: Duration) -> ModerationResult<Self> {
        if config.url.trim().is_empty() {
            return Err(ModerationError::Config(
                "http provider requires a url".to_string(),
            ));
        }

        Ok(Self {
            client: super::http_client(timeout)?,
            url: config.url.clone(),
            bearer_token: config.bearer_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl ModerationProvider for HttpProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        let request = self.client.post(&self.url);
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let request = match payload {
            Payload::Text(text) => request.json(&json!({ "text": text })),
            Payload::Binary(bytes) => request
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw: RawResult = response.json().await?;
        tracing::debug!(url = %self.url, score = raw.score, "Remote analyzer answered");
        Ok(raw)
    }
}
