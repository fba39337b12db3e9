//! Modality Analyzer - normalizes provider output for one modality.

use std::collections::BTreeSet;

use crate::domain::{Modality, ModalityResult, Payload, RawResult, DEFAULT_CONFIDENCE};
use crate::engine::{ProviderChain, Resolved};

/// Wraps the provider chain of one modality and normalizes its answers.
#[derive(Debug, Clone)]
pub struct ModalityAnalyzer {
    chain: ProviderChain,
    default_confidence: f64,
}

impl ModalityAnalyzer {
    pub fn new(chain: ProviderChain) -> Self {
        Self {
            chain,
            default_confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Override the confidence used when a provider reports none.
    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn modality(&self) -> Modality {
        self.chain.modality()
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Run the chain and normalize its answer.
    ///
    /// Returns `None` when every provider failed: the modality is unknown,
    /// which is not the same as unsafe.
    pub async fn analyze(&self, payload: &Payload) -> Option<ModalityResult> {
        match self.chain.resolve(payload).await {
            Ok(resolved) => Some(self.normalize(resolved)),
            Err(exhausted) => {
                tracing::warn!(
                    modality = %exhausted.modality,
                    attempts = exhausted.attempts.len(),
                    errors = ?exhausted.attempts,
                    "Provider chain exhausted, modality unavailable"
                );
                None
            }
        }
    }

    fn normalize(&self, resolved: Resolved) -> ModalityResult {
        let Resolved {
            raw,
            provider,
            skipped,
            latency_ms,
        } = resolved;
        let RawResult {
            score,
            flags,
            confidence,
            extras,
            ..
        } = raw;

        ModalityResult {
            score: score.clamp(0.0, 100.0),
            flags: normalize_flags(flags),
            confidence: confidence
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(self.default_confidence),
            provider,
            latency_ms,
            skipped,
            extras,
        }
    }
}

/// Lower-case, trim and de-duplicate flags, dropping empty ones.
pub fn normalize_flags<I, S>(flags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    flags
        .into_iter()
        .map(|f| f.as_ref().trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}
