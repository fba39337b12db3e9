//! Text safety classification with Meta Llama Guard over a chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::openrouter::ChatClient;
use crate::config::LlmProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::ModerationProvider;
use crate::error::{ModerationResult, ProviderError};

const DEFAULT_MODEL: &str = "meta-llama/llama-guard-4-12b";

const SAFE_SCORE: f64 = 95.0;
const UNSAFE_SCORE: f64 = 30.0;
const CRITICAL_SCORE: f64 = 10.0;
const CONFIDENCE: f64 = 0.85;

/// Hazard codes Llama Guard answers with, the flag each one raises, and
/// whether it pulls the score down to the critical floor.
const HAZARDS: &[(&str, &str, bool)] = &[
    ("s1", "violent_crimes", true),
    ("s2", "non_violent_crimes", false),
    ("s3", "sex_crimes", false),
    ("s4", "child_exploitation", true),
    ("s5", "defamation", false),
    ("s6", "specialized_advice", false),
    ("s7", "privacy", false),
    ("s8", "intellectual_property", false),
    ("s9", "indiscriminate_weapons", true),
    ("s10", "hate", false),
    ("s11", "self_harm", false),
    ("s12", "sexual_content", false),
    ("s13", "elections", false),
    ("s14", "code_interpreter_abuse", false),
];

/// One violated hazard code, lower-cased (`s10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyCategory {
    code: String,
}

impl SafetyCategory {
    fn from_code(code: &str) -> Self {
        Self {
            code: code.trim().to_lowercase(),
        }
    }

    fn hazard(&self) -> Option<&'static (&'static str, &'static str, bool)> {
        HAZARDS.iter().find(|(code, _, _)| *code == self.code)
    }

    /// Flag raised for this code; codes outside the table become
    /// `category_<code>` so nothing the classifier reports is dropped.
    pub fn slug(&self) -> String {
        match self.hazard() {
            Some((_, flag, _)) => flag.to_string(),
            None => format!("category_{}", self.code),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.hazard().is_some_and(|(_, _, critical)| *critical)
    }
}

/// Parsed Llama Guard answer.
#[derive(Debug, Clone)]
pub struct GuardResult {
    pub is_safe: bool,
    pub violated_categories: Vec<SafetyCategory>,
    pub raw_response: String,
}

impl GuardResult {
    /// Parse the Llama Guard answer format.
    ///
    /// The model answers `safe`, or `unsafe` followed by category codes on
    /// the next line (`unsafe\nS1,S2`) or inline (`unsafe S6`). Anything
    /// else is malformed.
    pub fn parse(response: &str) -> Result<Self, ProviderError> {
        let response = response.trim().to_lowercase();
        let mut lines = response.lines();
        let first = lines.next().unwrap_or_default().trim();
        let mut words = first.split_whitespace();

        match words.next() {
            Some("safe") => Ok(GuardResult {
                is_safe: true,
                violated_categories: Vec::new(),
                raw_response: response.clone(),
            }),
            Some("unsafe") => {
                let mut categories: Vec<SafetyCategory> = lines
                    .flat_map(|line| line.split(','))
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(SafetyCategory::from_code)
                    .collect();

                if categories.is_empty() {
                    categories = words
                        .map(|part| part.trim_matches(|c| c == ',' || c == '.'))
                        .filter(|code| code.starts_with('s') && code.len() <= 3)
                        .map(SafetyCategory::from_code)
                        .collect();
                }

                Ok(GuardResult {
                    is_safe: false,
                    violated_categories: categories,
                    raw_response: response.clone(),
                })
            }
            _ => Err(ProviderError::Malformed(format!(
                "unexpected classifier answer: {:?}",
                response
            ))),
        }
    }

    pub fn into_raw_result(self) -> RawResult {
        let score = if self.is_safe {
            SAFE_SCORE
        } else if self.violated_categories.iter().any(SafetyCategory::is_critical) {
            CRITICAL_SCORE
        } else {
            UNSAFE_SCORE
        };
        let flags = self
            .violated_categories
            .iter()
            .map(SafetyCategory::slug)
            .collect();

        RawResult::new(score, flags)
            .with_confidence(CONFIDENCE)
            .with_extras(json!({ "classifier_answer": self.raw_response }))
    }
}

/// Llama Guard text provider.
pub struct LlamaGuardProvider {
    chat: ChatClient,
}

impl LlamaGuardProvider {
    pub fn new(
        config: &LlmProviderConfig,
        api_key: String,
        timeout: Duration,
    ) -> ModerationResult<Self> {
        Ok(Self {
            chat: ChatClient::new(config, api_key, DEFAULT_MODEL, timeout)?,
        })
    }

    fn prompt(content: &str) -> String {
        format!(
            r#"<|begin_of_text|><|start_header_id|>user<|end_header_id|>

Task: Check if there is unsafe content in 'User' messages in conversations according to our safety policy.

<BEGIN CONVERSATION>

User: {}

<END CONVERSATION>

Provide your safety assessment for the User message.
- First line must read 'safe' or 'unsafe'.
- If unsafe, a second line must include a comma-separated list of violated categories.<|eot_id|><|start_header_id|>assistant<|end_header_id|>"#,
            content
        )
    }
}

#[async_trait]
impl ModerationProvider for LlamaGuardProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        let text = payload
            .as_text()
            .ok_or_else(|| ProviderError::Unavailable("llama_guard only scores text".to_string()))?;

        tracing::debug!(
            model = %self.chat.model(),
            content_len = text.len(),
            "Sending text to Llama Guard"
        );

        let answer = self.chat.complete(Self::prompt(text), 100).await?;
        let guard = GuardResult::parse(&answer)?;

        tracing::debug!(
            is_safe = guard.is_safe,
            categories = ?guard.violated_categories,
            "Llama Guard answer received"
        );

        Ok(guard.into_raw_result())
    }
}
