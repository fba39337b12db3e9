//! The final moderation decision.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Modality, ModalityOutcome};

/// Final tri-state verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Content is safe to publish.
    Allow,
    /// Content is borderline and should be marked.
    Flag,
    /// Content goes to human review.
    Escalate,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => write!(f, "ALLOW"),
            Verdict::Flag => write!(f, "FLAG"),
            Verdict::Escalate => write!(f, "ESCALATE"),
        }
    }
}

/// Combined decision over every modality of a request.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Correlation id used in logs for this analysis.
    pub request_id: Uuid,
    pub verdict: Verdict,
    /// Minimum score over decided modalities; `None` when none was decided.
    pub overall_score: Option<f64>,
    pub combined_flags: BTreeSet<String>,
    pub explanation: String,
    /// One entry per requested modality; `None` when its chain was exhausted.
    pub per_modality: BTreeMap<Modality, Option<ModalityOutcome>>,
    /// Wall time of the whole analysis.
    pub elapsed_ms: u64,
}

impl Decision {
    /// Outcome for a modality, `None` if it was absent or unavailable.
    pub fn outcome(&self, modality: Modality) -> Option<&ModalityOutcome> {
        self.per_modality.get(&modality).and_then(Option::as_ref)
    }

    pub fn unavailable_count(&self) -> usize {
        self.per_modality.values().filter(|o| o.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::Allow).unwrap(), "\"ALLOW\"");
        assert_eq!(serde_json::to_string(&Verdict::Flag).unwrap(), "\"FLAG\"");
        assert_eq!(
            serde_json::to_string(&Verdict::Escalate).unwrap(),
            "\"ESCALATE\""
        );
    }

    #[test]
    fn test_absent_and_unavailable_read_as_none() {
        let mut per_modality = BTreeMap::new();
        per_modality.insert(Modality::Image, None);
        let decision = Decision {
            request_id: Uuid::new_v4(),
            verdict: Verdict::Escalate,
            overall_score: None,
            combined_flags: BTreeSet::new(),
            explanation: String::new(),
            per_modality,
            elapsed_ms: 0,
        };

        assert!(decision.outcome(Modality::Image).is_none());
        assert!(decision.outcome(Modality::Text).is_none());
        assert_eq!(decision.unavailable_count(), 1);
    }
}
