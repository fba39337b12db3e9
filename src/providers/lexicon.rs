//! Local keyword-density text scorer.
//!
//! Always available and free, which makes it the natural last entry of a
//! text chain.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::json;

use crate::config::LexiconProviderConfig;
use crate::domain::{Payload, RawResult};
use crate::engine::ModerationProvider;
use crate::error::ProviderError;

const PENALTY_PER_HIT: f64 = 25.0;
const CONFIDENCE: f64 = 0.6;

/// Built-in `term -> category` table.
const BUILTIN_TERMS: &[(&str, &str)] = &[
    ("hate", "hate"),
    ("racist", "hate"),
    ("kill", "violence"),
    ("murder", "violence"),
    ("attack", "violence"),
    ("violence", "violence"),
    ("bomb", "violence"),
    ("weapon", "weapons"),
    ("gun", "weapons"),
    ("terrorist", "terrorism"),
    ("abuse", "harassment"),
    ("threat", "threat"),
    ("idiot", "insult"),
    ("stupid", "insult"),
    ("suicide", "self_harm"),
    ("porn", "sexual"),
    ("nude", "sexual"),
];

pub struct LexiconProvider {
    terms: BTreeMap<String, String>,
}

impl LexiconProvider {
    pub fn new(terms: BTreeMap<String, String>) -> Self {
        let terms = terms
            .into_iter()
            .map(|(term, category)| (term.trim().to_lowercase(), category.trim().to_lowercase()))
            .filter(|(term, category)| !term.is_empty() && !category.is_empty())
            .collect();
        Self { terms }
    }

    /// Score text: each distinct term hit costs 25 points.
    pub fn score(&self, text: &str) -> RawResult {
        let text_lower = text.to_lowercase();
        let hits: Vec<&str> = self
            .terms
            .keys()
            .filter(|term| text_lower.contains(term.as_str()))
            .map(String::as_str)
            .collect();
        let categories: BTreeSet<String> = hits
            .iter()
            .filter_map(|term| self.terms.get(*term).cloned())
            .collect();

        let score = (100.0 - PENALTY_PER_HIT * hits.len() as f64).max(0.0);

        RawResult::new(score, categories.into_iter().collect())
            .with_confidence(CONFIDENCE)
            .with_extras(json!({ "matched_terms": hits }))
    }
}

impl Default for LexiconProvider {
    fn default() -> Self {
        Self::from(&LexiconProviderConfig::default())
    }
}

impl From<&LexiconProviderConfig> for LexiconProvider {
    fn from(config: &LexiconProviderConfig) -> Self {
        let terms = BUILTIN_TERMS
            .iter()
            .map(|(term, category)| (term.to_string(), category.to_string()))
            .chain(config.extra_terms.clone())
            .collect();
        Self::new(terms)
    }
}

#[async_trait]
impl ModerationProvider for LexiconProvider {
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError> {
        payload
            .as_text()
            .map(|text| self.score(text))
            .ok_or_else(|| ProviderError::Unavailable("lexicon only scores text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_scores_full() {
        let raw = LexiconProvider::default().score("Thank you for your support!");
        assert_eq!(raw.score, 100.0);
        assert!(raw.flags.is_empty());
        assert_eq!(raw.confidence, Some(0.6));
    }

    #[test]
    fn test_each_hit_costs_25() {
        let lexicon = LexiconProvider::default();
        assert_eq!(lexicon.score("you idiot").score, 75.0);

        let raw = lexicon.score("I will KILL you with a gun, idiot");
        assert_eq!(raw.score, 25.0);
        assert_eq!(raw.flags, vec!["insult", "violence", "weapons"]);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let raw = LexiconProvider::default()
            .score("hate, murder, bomb, weapon, terrorist attack threat");
        assert_eq!(raw.score, 0.0);
        assert!(raw.flags.contains(&"terrorism".to_string()));
    }

    #[test]
    fn test_extra_terms_extend_table() {
        let mut config = LexiconProviderConfig::default();
        config
            .extra_terms
            .insert("Scam".to_string(), "Fraud".to_string());
        let lexicon = LexiconProvider::from(&config);

        let raw = lexicon.score("this is a scam");
        assert_eq!(raw.score, 75.0);
        assert_eq!(raw.flags, vec!["fraud"]);
        assert_eq!(raw.extras.unwrap()["matched_terms"], json!(["scam"]));
    }

    #[tokio::test]
    async fn test_binary_payload_unavailable() {
        let err = LexiconProvider::default()
            .invoke(&Payload::Binary(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
