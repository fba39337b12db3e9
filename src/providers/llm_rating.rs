//! General-purpose LLM prompted for a 0-100 safety rating.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::openrouter::ChatClient;
use crate::config::LlmProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::ModerationProvider;
use crate::error::{ModerationResult, ProviderError};

const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct";

pub struct LlmRatingProvider {
    chat: ChatClient,
}

impl LlmRatingProvider {
    pub fn new(
        config: &LlmProviderConfig,
        api_key: String,
        timeout: Duration,
    ) -> ModerationResult<Self> {
        Ok(Self {
            chat: ChatClient::new(config, api_key, DEFAULT_MODEL, timeout)?,
        })
    }

    fn prompt(text: &str) -> String {
        format!(
            "Analyze the following text for content safety.\n\
             Rate it on a scale of 0-100 where 100 is completely safe.\n\
             List any concerning content categories (hate speech, violence, harassment, etc.).\n\
             \n\
             Text: {}\n\
             \n\
             Respond in this exact format:\n\
             SAFETY_SCORE: [number]\n\
             FLAGS: [comma-separated list or \"none\"]\n\
             EXPLANATION: [brief explanation]",
            text
        )
    }
}

/// Parse the `SAFETY_SCORE / FLAGS / EXPLANATION` answer.
///
/// A missing or unreadable score is malformed; the rating is never guessed.
pub fn parse_rating(answer: &str) -> Result<RawResult, ProviderError> {
    let mut score = None;
    let mut flags = Vec::new();
    let mut explanation = None;

    for line in answer.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().trim_matches('*').to_uppercase().as_str() {
            "SAFETY_SCORE" => score = Some(parse_score(value)?),
            "FLAGS" => {
                if !value.eq_ignore_ascii_case("none") {
                    flags = value
                        .split(',')
                        .map(|f| f.trim().replace(' ', "_"))
                        .filter(|f| !f.is_empty())
                        .collect();
                }
            }
            "EXPLANATION" => explanation = Some(value.to_string()),
            _ => {}
        }
    }

    let score = score
        .ok_or_else(|| ProviderError::Malformed("answer has no SAFETY_SCORE line".to_string()))?;

    let raw = RawResult::new(score, flags);
    Ok(match explanation {
        Some(explanation) => raw.with_extras(json!({ "explanation": explanation })),
        None => raw,
    })
}

/// Accepts `85`, `85%`, `85/100` and bracketed forms.
fn parse_score(value: &str) -> Result<f64, ProviderError> {
    let cleaned = value
        .trim_matches(|c| c == '[' || c == ']')
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('%');

    cleaned
        .parse::<f64>()
        .map_err(|_| ProviderError::Malformed(format!("unreadable SAFETY_SCORE: {:?}", value)))
}

#[async_trait]
impl ModerationProvider for LlmRatingProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        let text = payload
            .as_text()
            .ok_or_else(|| ProviderError::Unavailable("llm_rating only scores text".to_string()))?;

        let answer = self.chat.complete(Self::prompt(text), 200).await?;
        let raw = parse_rating(&answer)?;

        tracing::debug!(
            model = %self.chat.model(),
            score = raw.score,
            flags = ?raw.flags,
            "LLM rating received"
        );

        Ok(raw)
    }
}
