//! Local skin-tone ratio image scorer.

use async_trait::async_trait;
use serde_json::json;

use crate::config::SkinToneProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::{skin_tone_ratio, ModerationProvider};
use crate::error::ProviderError;

const CONFIDENCE: f64 = 0.4;

/// Scores `(1 - skin ratio) * 100`; a crude but always available signal.
pub struct SkinToneProvider {
    suspicious_ratio: f64,
    explicit_ratio: f64,
}

impl SkinToneProvider {
    pub fn new(suspicious_ratio: f64, explicit_ratio: f64) -> Self {
        Self {
            suspicious_ratio: suspicious_ratio.min(explicit_ratio),
            explicit_ratio,
        }
    }

    fn score(&self, ratio: f64) -> RawResult {
        let mut flags = Vec::new();
        if ratio > self.explicit_ratio {
            flags.push("explicit_nudity".to_string());
        } else if ratio > self.suspicious_ratio {
            flags.push("suggestive".to_string());
        }

        RawResult::new((1.0 - ratio) * 100.0, flags)
            .with_confidence(CONFIDENCE)
            .with_extras(json!({ "skin_ratio": ratio }))
    }
}

impl From<&SkinToneProviderConfig> for SkinToneProvider {
    fn from(config: &SkinToneProviderConfig) -> Self {
        Self::new(config.suspicious_ratio, config.explicit_ratio)
    }
}

#[async_trait]
impl ModerationProvider for SkinToneProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        let bytes = payload.as_bytes().to_vec();

        // Decoding is CPU bound; keep it off the async workers.
        let ratio = tokio::task::spawn_blocking(move || skin_tone_ratio(&bytes))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("image scan aborted: {}", e)))?
            .map_err(|e| ProviderError::Malformed(format!("undecodable image: {}", e)))?;

        Ok(self.score(ratio))
    }
}
