//! API request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Decision, Modality, ModalityLabel, ModalityOutcome, PrefilterRisk, Verdict};
use crate::engine::Assessment;

// ==================== Requests ====================

/// Request to moderate a piece of text.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TextModerationRequest {
    /// Text to analyze.
    pub text: String,
}

/// Multipart form for single media uploads.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct AudioUpload {
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

/// Multipart form for multimodal requests; at least one field is required.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct MultimodalUpload {
    pub text: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub audio: Option<Vec<u8>>,
}

// ==================== Responses ====================

/// Result of a single-modality analysis.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModalityResponse {
    pub decision: Verdict,
    /// 0-100, higher is safer; null when every provider failed.
    pub safety_score: Option<f64>,
    pub confidence: Option<f64>,
    pub explanation: String,
    pub flags: Vec<String>,
    /// Provider that produced the result; null when every provider failed.
    pub provider: Option<String>,
    pub processing_time_ms: u64,
    /// Provisional label from the classification tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<ModalityLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefilter_risk: Option<PrefilterRisk>,
    /// Whether a higher-priority provider failed first.
    pub fallback_used: bool,
    /// Provider-specific data such as transcripts or detected labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub extras: Option<serde_json::Value>,
}

impl ModalityResponse {
    pub fn new(
        assessment: Assessment,
        outcome: Option<&ModalityOutcome>,
        processing_time_ms: u64,
    ) -> Self {
        let Assessment {
            verdict,
            explanation,
        } = assessment;

        match outcome {
            Some(outcome) => Self {
                decision: verdict,
                safety_score: Some(outcome.result.score),
                confidence: Some(outcome.result.confidence),
                explanation,
                flags: outcome.result.flags.iter().cloned().collect(),
                provider: Some(outcome.result.provider.clone()),
                processing_time_ms,
                label: Some(outcome.label),
                prefilter_risk: Some(outcome.prefilter),
                fallback_used: outcome.result.skipped > 0,
                extras: outcome.result.extras.clone(),
            },
            None => Self {
                decision: verdict,
                safety_score: None,
                confidence: None,
                explanation,
                flags: Vec::new(),
                provider: None,
                processing_time_ms,
                label: None,
                prefilter_risk: None,
                fallback_used: false,
                extras: None,
            },
        }
    }

    /// Response for a request that carried exactly one modality.
    pub fn from_decision(decision: &Decision, modality: Modality) -> Self {
        Self::new(
            Assessment {
                verdict: decision.verdict,
                explanation: decision.explanation.clone(),
            },
            decision.outcome(modality),
            decision.elapsed_ms,
        )
    }
}

/// Result of a multimodal analysis.
#[derive(Debug, Serialize, ToSchema)]
pub struct MultimodalResponse {
    pub request_id: Uuid,
    pub decision: Verdict,
    /// Lowest score over the analyzed modalities; null when none could be analyzed.
    pub overall_safety_score: Option<f64>,
    pub combined_flags: Vec<String>,
    pub explanation: String,
    /// One entry per submitted modality; null when that modality was unavailable.
    #[schema(value_type = BTreeMap<String, ModalityResponse>)]
    pub results: BTreeMap<String, Option<ModalityResponse>>,
    pub processing_time_ms: u64,
}

// ==================== Health ====================

/// Provider names per modality, in fallback order.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderChains {
    pub text: Vec<String>,
    pub image: Vec<String>,
    pub audio: Vec<String>,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    pub providers: ProviderChains,
    /// Timestamp.
    pub timestamp: String,
}
