//! Decision Engine - maps aggregated scores and flags to a verdict.
//!
//! Pure and deterministic: the same score, flags and per-modality outcomes
//! always produce the same verdict and explanation.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ModerationConfig;
use crate::domain::{Modality, ModalityLabel, ModalityOutcome, Verdict};

/// Explanation used when no modality could be analyzed.
pub const ALL_UNAVAILABLE: &str = "all analysis providers unavailable";

/// Thresholds and critical flags, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    safe_threshold: f64,
    flag_threshold: f64,
    critical_flags: BTreeSet<String>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from(&ModerationConfig::default())
    }
}

impl From<&ModerationConfig> for DecisionPolicy {
    fn from(config: &ModerationConfig) -> Self {
        Self::new(
            config.safe_threshold,
            config.flag_threshold,
            config.critical_flags.iter().cloned(),
        )
    }
}

impl DecisionPolicy {
    pub fn new<I, S>(safe_threshold: f64, flag_threshold: f64, critical_flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            safe_threshold,
            flag_threshold,
            critical_flags: crate::engine::normalize_flags(critical_flags),
        }
    }

    /// Provisional label for a single modality score.
    pub fn label(&self, score: f64) -> ModalityLabel {
        if score >= self.safe_threshold {
            ModalityLabel::Safe
        } else if score >= self.flag_threshold {
            ModalityLabel::Warning
        } else {
            ModalityLabel::Unsafe
        }
    }

    /// Flags that contain a critical category.
    ///
    /// Matching is by substring so that `child_abuse_content` still counts
    /// as `child_abuse`.
    pub fn critical_hits<'a>(&self, flags: &'a BTreeSet<String>) -> Vec<&'a str> {
        flags
            .iter()
            .filter(|flag| {
                self.critical_flags
                    .iter()
                    .any(|critical| flag.contains(critical.as_str()))
            })
            .map(String::as_str)
            .collect()
    }
}

/// Verdict plus its explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: Verdict,
    pub explanation: String,
}

/// Applies the decision policy.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    /// Map the aggregate to a verdict.
    ///
    /// Order of rules:
    /// 1. Every requested modality unavailable -> Escalate
    /// 2. Any critical flag -> Escalate
    /// 3. Score bands: >= safe -> Allow, >= flag -> Flag, else Escalate
    pub fn verdict(
        &self,
        overall_score: Option<f64>,
        combined_flags: &BTreeSet<String>,
        unavailable_count: usize,
        total_modalities: usize,
    ) -> Verdict {
        if unavailable_count >= total_modalities {
            return Verdict::Escalate;
        }
        if !self.policy.critical_hits(combined_flags).is_empty() {
            return Verdict::Escalate;
        }
        let Some(score) = overall_score else {
            return Verdict::Escalate;
        };

        match self.policy.label(score) {
            ModalityLabel::Safe => Verdict::Allow,
            ModalityLabel::Warning => Verdict::Flag,
            ModalityLabel::Unsafe => Verdict::Escalate,
        }
    }

    /// Decide and explain from the aggregate and the per-modality outcomes.
    pub fn assess(
        &self,
        overall_score: Option<f64>,
        combined_flags: &BTreeSet<String>,
        per_modality: &BTreeMap<Modality, Option<ModalityOutcome>>,
    ) -> Assessment {
        let unavailable: Vec<Modality> = per_modality
            .iter()
            .filter(|(_, outcome)| outcome.is_none())
            .map(|(modality, _)| *modality)
            .collect();

        let verdict = self.verdict(
            overall_score,
            combined_flags,
            unavailable.len(),
            per_modality.len(),
        );

        let explanation = self.explain(
            verdict,
            overall_score,
            combined_flags,
            per_modality,
            &unavailable,
        );

        Assessment {
            verdict,
            explanation,
        }
    }

    fn explain(
        &self,
        verdict: Verdict,
        overall_score: Option<f64>,
        combined_flags: &BTreeSet<String>,
        per_modality: &BTreeMap<Modality, Option<ModalityOutcome>>,
        unavailable: &[Modality],
    ) -> String {
        let score = match overall_score {
            Some(score) if unavailable.len() < per_modality.len() => score,
            _ => return ALL_UNAVAILABLE.to_string(),
        };

        let mut parts = Vec::new();

        let critical = self.policy.critical_hits(combined_flags);
        if !critical.is_empty() {
            let raised: Vec<String> = critical
                .iter()
                .map(|flag| format!("{} ({})", flag, raised_by(flag, per_modality)))
                .collect();
            parts.push(format!(
                "critical flags raised: {}; escalated regardless of overall score {:.1}",
                raised.join(", "),
                score
            ));
        } else {
            let band = match self.policy.label(score) {
                ModalityLabel::Safe => format!("safe band (>= {})", self.policy.safe_threshold),
                ModalityLabel::Warning => format!(
                    "warning band ({}-{})",
                    self.policy.flag_threshold, self.policy.safe_threshold
                ),
                ModalityLabel::Unsafe => {
                    format!("unsafe band (< {})", self.policy.flag_threshold)
                }
            };
            let drivers: Vec<&str> = per_modality
                .iter()
                .filter_map(|(modality, outcome)| {
                    outcome
                        .as_ref()
                        .filter(|o| o.result.score == score)
                        .map(|_| modality.as_str())
                })
                .collect();
            parts.push(format!(
                "{}: overall score {:.1} from {} is in the {}",
                verdict,
                score,
                drivers.join(", "),
                band
            ));

            if !combined_flags.is_empty() {
                let flags: Vec<String> = combined_flags
                    .iter()
                    .map(|flag| format!("{} ({})", flag, raised_by(flag, per_modality)))
                    .collect();
                parts.push(format!("flags: {}", flags.join(", ")));
            }
        }

        if !unavailable.is_empty() {
            let names: Vec<&str> = unavailable.iter().map(Modality::as_str).collect();
            parts.push(format!("unavailable: {}", names.join(", ")));
        }

        parts.join("; ")
    }
}

/// Modalities whose result carries `flag`, comma separated.
fn raised_by(flag: &str, per_modality: &BTreeMap<Modality, Option<ModalityOutcome>>) -> String {
    per_modality
        .iter()
        .filter_map(|(modality, outcome)| {
            outcome
                .as_ref()
                .filter(|o| o.result.flags.contains(flag))
                .map(|_| modality.as_str())
        })
        .collect::<Vec<_>>()
        .join(", ")
}
