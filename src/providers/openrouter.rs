//! OpenAI-compatible chat-completions client (OpenRouter by default).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmProviderConfig;
use crate::error::{ModerationResult, ProviderError};

/// Request to the chat-completions API.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Response from the chat-completions API.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        config: &LlmProviderConfig,
        api_key: String,
        default_model: &str,
        timeout: Duration,
    ) -> ModerationResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single user message and return the assistant's answer.
    pub async fn complete(&self, prompt: String, max_tokens: u32) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: Some(max_tokens),
            temperature: Some(0.0),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Moderation Core")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("empty completion".to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn client(endpoint: String) -> ChatClient {
        let config = LlmProviderConfig {
            endpoint,
            ..Default::default()
        };
        ChatClient::new(&config, "key".to_string(), "test/model", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_model_defaults_per_provider() {
        let chat = client("http://127.0.0.1:9".to_string());
        assert_eq!(chat.model(), "test/model");

        let config = LlmProviderConfig {
            model: Some("custom/model".to_string()),
            ..Default::default()
        };
        let chat =
            ChatClient::new(&config, "key".to_string(), "test/model", Duration::from_secs(1)).unwrap();
        assert_eq!(chat.model(), "custom/model");
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let chat = client(stub::answering("safe").await);
        assert_eq!(chat.complete("hi".to_string(), 10).await.unwrap(), "safe");
    }

    #[tokio::test]
    async fn test_upstream_status_is_reported() {
        let chat = client(stub::failing(StatusCode::TOO_MANY_REQUESTS).await);
        let err = chat.complete("hi".to_string(), 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed() {
        let chat = client(stub::answering("   ").await);
        let err = chat.complete("hi".to_string(), 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
