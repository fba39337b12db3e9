//! Provider output and its normalized per-modality form.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Confidence assigned when a provider does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Raw output of a single provider call.
///
/// `score` is on a 0-100 scale where higher means safer. `extras` carries
/// provider-specific data (transcripts, detected labels) that is passed
/// through to the response and never used for the decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub score: f64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub extras: Option<serde_json::Value>,
    /// Provenance reported by providers that delegate to other providers.
    /// Replaces the handle name when set; never read from the wire.
    #[serde(skip)]
    pub provenance: Option<String>,
}

impl RawResult {
    pub fn new(score: f64, flags: Vec<String>) -> Self {
        Self {
            score,
            flags,
            confidence: None,
            extras: None,
            provenance: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_extras(mut self, extras: serde_json::Value) -> Self {
        self.extras = Some(extras);
        self
    }
}

/// Normalized result for one modality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityResult {
    /// Safety score, clamped to 0-100.
    pub score: f64,
    /// Lower-cased, de-duplicated flags.
    pub flags: BTreeSet<String>,
    /// Provider confidence in 0-1 (informational only).
    pub confidence: f64,
    /// Name of the provider that answered, or `prefilter`.
    pub provider: String,
    /// Wall time of the answering provider call.
    pub latency_ms: u64,
    /// Providers earlier in the chain that failed before this one answered.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

/// Provisional per-modality label from the classification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModalityLabel {
    Safe,
    Warning,
    Unsafe,
}

impl std::fmt::Display for ModalityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModalityLabel::Safe => write!(f, "safe"),
            ModalityLabel::Warning => write!(f, "warning"),
            ModalityLabel::Unsafe => write!(f, "unsafe"),
        }
    }
}

/// Risk seen by the fast prefilter before deep analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrefilterRisk {
    /// No prefilter ran for this modality, or it could not inspect the content.
    Unknown,
    Low,
    Medium,
    High,
}

/// A decided modality: its normalized result plus tier annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityOutcome {
    pub result: ModalityResult,
    pub label: ModalityLabel,
    pub prefilter: PrefilterRisk,
}
