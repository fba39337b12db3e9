//! Speech moderation: transcribe the clip, then score the transcript.
//!
//! The transcriber is a remote service answering
//! `{text, segments?, language?, provider?}`. The transcript is resolved
//! against the text chain, so audio inherits every text provider and its
//! fallback order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::HttpProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::{ModerationProvider, ProviderChain, Resolved};
use crate::error::{ModerationError, ModerationResult, ProviderError};

/// Timestamped piece of a transcript, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    language: Option<String>,
    /// Speech engine behind the service, e.g. `whisper`.
    #[serde(default)]
    provider: Option<String>,
}

pub struct TranscribeProvider {
    client: Client,
    url: String,
    bearer_token: Option<String>,
    name: String,
    text_chain: ProviderChain,
}

impl TranscribeProvider {
    pub fn new(
        name: impl Into<String>,
        config: &HttpProviderConfig,
        text_chain: ProviderChain,
        timeout: Duration,
    ) -> ModerationResult<Self> {
        if config.url.trim().is_empty() {
            return Err(ModerationError::Config(
                "transcribe provider requires a url".to_string(),
            ));
        }

        Ok(Self {
            client: super::http_client(timeout)?,
            url: config.url.clone(),
            bearer_token: config.bearer_token.clone().filter(|t| !t.is_empty()),
            name: name.into(),
            text_chain,
        })
    }

    /// Attempt budget: the transcription call plus one full attempt per
    /// text provider.
    pub fn attempt_budget(&self, timeout: Duration) -> Duration {
        timeout + self.text_chain.timeout() * self.text_chain.len() as u32
    }

    async fn transcribe(&self, bytes: &[u8]) -> Result<Transcription, ProviderError> {
        let request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
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

        let transcription: Transcription = response.json().await?;
        tracing::debug!(
            url = %self.url,
            chars = transcription.text.len(),
            segments = transcription.segments.len(),
            "Transcription received"
        );
        Ok(transcription)
    }
}

#[async_trait]
impl ModerationProvider for TranscribeProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        let Payload::Binary(bytes) = payload else {
            return Err(ProviderError::Unavailable(
                "transcription needs an audio payload".to_string(),
            ));
        };

        let transcription = self.transcribe(bytes).await?;
        let speech = transcription
            .provider
            .clone()
            .unwrap_or_else(|| self.name.clone());

        let scored = self
            .text_chain
            .resolve(&Payload::Text(transcription.text.clone()))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("transcript not scored: {}", e)))?;

        Ok(speech_result(transcription, &speech, scored))
    }
}

/// Transcript score with `transcript`, `segments` and `flagged_segments`
/// extras. When the transcript carries flags every segment is flagged.
fn speech_result(transcription: Transcription, speech: &str, scored: Resolved) -> RawResult {
    let Resolved { raw, provider, .. } = scored;

    let flagged_segments: Vec<Value> = if raw.flags.is_empty() {
        Vec::new()
    } else {
        transcription
            .segments
            .iter()
            .map(|segment| {
                json!({
                    "start": segment.start,
                    "end": segment.end,
                    "text": segment.text,
                    "flags": raw.flags,
                })
            })
            .collect()
    };

    let mut extras = json!({
        "transcript": transcription.text,
        "segments": transcription.segments,
        "flagged_segments": flagged_segments,
    });
    if let Some(language) = transcription.language {
        extras["language"] = json!(language);
    }
    if let Some(analysis) = raw.extras {
        extras["transcript_analysis"] = analysis;
    }

    let mut result = RawResult::new(raw.score, raw.flags).with_extras(extras);
    result.confidence = raw.confidence;
    result.provenance = Some(format!("speech:{}+text:{}", speech, provider));
    result
}
