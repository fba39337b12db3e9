//! Tiered Pipeline - the three moderation stages for one modality.
//!
//! 1. Prefilter: synchronous heuristics, may decide immediately
//! 2. Deep analysis: the modality's provider chain
//! 3. Classification: provisional safe/warning/unsafe label

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::PrefilterConfig;
use crate::domain::{
    Modality, ModalityLabel, ModalityOutcome, ModalityResult, Payload, PrefilterRisk,
};
use crate::engine::{DecisionPolicy, ModalityAnalyzer, Prefilter, PrefilterOutcome};

/// Provider name recorded when the prefilter decides a modality.
pub const PREFILTER_PROVIDER: &str = "prefilter";

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Decided(ModalityOutcome),
    /// No prefilter hit and every provider failed.
    Unavailable,
}

impl PipelineOutcome {
    pub fn into_option(self) -> Option<ModalityOutcome> {
        match self {
            PipelineOutcome::Decided(outcome) => Some(outcome),
            PipelineOutcome::Unavailable => None,
        }
    }
}

/// Score and confidence forced onto prefilter violations.
#[derive(Debug, Clone, Copy)]
pub struct PrefilterVerdict {
    pub score: f64,
    pub confidence: f64,
}

impl Default for PrefilterVerdict {
    fn default() -> Self {
        Self {
            score: 10.0,
            confidence: 0.9,
        }
    }
}

impl From<&PrefilterConfig> for PrefilterVerdict {
    fn from(config: &PrefilterConfig) -> Self {
        Self {
            score: config.forced_score,
            confidence: config.confidence,
        }
    }
}

/// Runs prefilter, deep analysis and classification for one modality.
pub struct TieredPipeline {
    prefilter: Option<Arc<dyn Prefilter>>,
    analyzer: ModalityAnalyzer,
    forced: PrefilterVerdict,
    policy: DecisionPolicy,
}

impl TieredPipeline {
    pub fn new(analyzer: ModalityAnalyzer, policy: DecisionPolicy) -> Self {
        Self {
            prefilter: None,
            analyzer,
            forced: PrefilterVerdict::default(),
            policy,
        }
    }

    pub fn with_prefilter(mut self, prefilter: Arc<dyn Prefilter>, forced: PrefilterVerdict) -> Self {
        self.prefilter = Some(prefilter);
        self.forced = forced;
        self
    }

    pub fn modality(&self) -> Modality {
        self.analyzer.modality()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.analyzer.chain().provider_names()
    }

    pub async fn run(&self, payload: &Payload) -> PipelineOutcome {
        let modality = self.modality();

        // Tier 1: Prefilter
        let prefilter_outcome = self
            .prefilter
            .as_ref()
            .map(|prefilter| {
                let outcome = prefilter.check(payload);
                tracing::debug!(
                    modality = %modality,
                    prefilter = prefilter.name(),
                    outcome = ?outcome,
                    "Prefilter check complete"
                );
                outcome
            });

        let prefilter_risk = prefilter_outcome
            .as_ref()
            .map(PrefilterOutcome::risk)
            .unwrap_or(PrefilterRisk::Unknown);

        if let Some(PrefilterOutcome::Violation { flags }) = prefilter_outcome {
            tracing::info!(
                modality = %modality,
                flags = ?flags,
                "Prefilter violation, skipping deep analysis"
            );
            return PipelineOutcome::Decided(self.prefilter_decision(flags));
        }

        // Tier 2: Deep analysis
        let Some(result) = self.analyzer.analyze(payload).await else {
            return PipelineOutcome::Unavailable;
        };

        // Tier 3: Classification
        let label = self.policy.label(result.score);
        tracing::debug!(
            modality = %modality,
            provider = %result.provider,
            score = result.score,
            label = %label,
            "Modality classified"
        );

        PipelineOutcome::Decided(ModalityOutcome {
            result,
            label,
            prefilter: prefilter_risk,
        })
    }

    fn prefilter_decision(&self, flags: Vec<String>) -> ModalityOutcome {
        let flags: BTreeSet<String> = crate::engine::normalize_flags(flags);
        ModalityOutcome {
            result: ModalityResult {
                score: self.forced.score,
                flags,
                confidence: self.forced.confidence,
                provider: PREFILTER_PROVIDER.to_string(),
                latency_ms: 0,
                skipped: 0,
                extras: None,
            },
            label: ModalityLabel::Unsafe,
            prefilter: PrefilterRisk::High,
        }
    }
}
