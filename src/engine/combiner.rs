//! Multimodal Combiner - fans a request out to the modality pipelines.
//!
//! This is the entry point of the engine. Each present modality runs as its
//! own task; the combiner joins all of them, aggregates conservatively and
//! hands the aggregate to the decision engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Decision, Modality, ModalityOutcome, ModerationRequest};
use crate::engine::{
    Assessment, DecisionEngine, DecisionPolicy, KeywordPrefilter, ModalityAnalyzer,
    PrefilterVerdict, ProviderRegistry, SkinTonePrefilter, TieredPipeline,
};
use crate::error::{ModerationError, ModerationResult};

/// Conservative aggregate over the decided modalities.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Lowest decided score; `None` when nothing was decided.
    pub overall_score: Option<f64>,
    /// Union of flags over decided modalities.
    pub combined_flags: BTreeSet<String>,
}

impl Aggregate {
    pub fn from_outcomes(per_modality: &BTreeMap<Modality, Option<ModalityOutcome>>) -> Self {
        let decided = per_modality.values().flatten();

        let overall_score = decided
            .clone()
            .map(|o| o.result.score)
            .reduce(f64::min);
        let combined_flags = decided
            .flat_map(|o| o.result.flags.iter().cloned())
            .collect();

        Self {
            overall_score,
            combined_flags,
        }
    }
}

/// Orchestrates the per-modality pipelines and the final decision.
pub struct MultimodalCombiner {
    pipelines: BTreeMap<Modality, Arc<TieredPipeline>>,
    decision_engine: DecisionEngine,
}

impl MultimodalCombiner {
    /// Create a combiner; exactly one pipeline per modality is required.
    pub fn new(
        pipelines: Vec<TieredPipeline>,
        decision_engine: DecisionEngine,
    ) -> ModerationResult<Self> {
        let mut by_modality = BTreeMap::new();
        for pipeline in pipelines {
            let modality = pipeline.modality();
            if by_modality.insert(modality, Arc::new(pipeline)).is_some() {
                return Err(ModerationError::Config(format!(
                    "more than one {} pipeline configured",
                    modality
                )));
            }
        }
        if let Some(missing) = Modality::ALL.iter().find(|m| !by_modality.contains_key(*m)) {
            return Err(ModerationError::Config(format!(
                "no {} pipeline configured",
                missing
            )));
        }

        Ok(Self {
            pipelines: by_modality,
            decision_engine,
        })
    }

    /// Wire prefilters, analyzers and the decision policy from configuration.
    pub fn from_config(registry: &ProviderRegistry, config: &Config) -> ModerationResult<Self> {
        let policy = DecisionPolicy::from(&config.moderation);
        let forced = PrefilterVerdict::from(&config.prefilter);

        let pipelines = Modality::ALL
            .iter()
            .map(|&modality| {
                let analyzer = ModalityAnalyzer::new(registry.chain(modality).clone())
                    .with_default_confidence(config.moderation.default_confidence);
                let pipeline = TieredPipeline::new(analyzer, policy.clone());

                if !config.prefilter.enabled {
                    return pipeline;
                }
                match modality {
                    Modality::Text => pipeline.with_prefilter(
                        Arc::new(KeywordPrefilter::new(
                            config.prefilter.text_keywords.clone(),
                            config.prefilter.text_min_hits,
                        )),
                        forced,
                    ),
                    Modality::Image => pipeline.with_prefilter(
                        Arc::new(SkinTonePrefilter::new(
                            config.prefilter.skin_ratio_threshold,
                            config.prefilter.skin_suspicious_ratio,
                        )),
                        forced,
                    ),
                    Modality::Audio => pipeline,
                }
            })
            .collect();

        Self::new(pipelines, DecisionEngine::new(policy))
    }

    /// Provider names of a modality's chain, in priority order.
    pub fn provider_names(&self, modality: Modality) -> Vec<String> {
        self.pipelines
            .get(&modality)
            .map(|p| p.provider_names())
            .unwrap_or_default()
    }

    /// Moderate a request.
    ///
    /// Fails only for requests without any content. Provider failures
    /// degrade modalities to unavailable and never surface as errors.
    /// Dropping the returned future aborts every in-flight modality task.
    pub async fn moderate(&self, request: ModerationRequest) -> ModerationResult<Decision> {
        request.validate()?;

        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let mut per_modality: BTreeMap<Modality, Option<ModalityOutcome>> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (modality, payload) in request.into_payloads() {
            per_modality.insert(modality, None);
            let pipeline = Arc::clone(&self.pipelines[&modality]);
            tasks.spawn(async move { (modality, pipeline.run(&payload).await) });
        }

        tracing::debug!(
            request_id = %request_id,
            modalities = ?per_modality.keys().collect::<Vec<_>>(),
            "Modality pipelines started"
        );

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((modality, outcome)) => {
                    per_modality.insert(modality, outcome.into_option());
                }
                Err(e) => {
                    // The modality stays unavailable.
                    tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Modality pipeline task failed"
                    );
                }
            }
        }

        let aggregate = Aggregate::from_outcomes(&per_modality);
        let Assessment {
            verdict,
            explanation,
        } = self.decision_engine.assess(
            aggregate.overall_score,
            &aggregate.combined_flags,
            &per_modality,
        );
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let decision = Decision {
            request_id,
            verdict,
            overall_score: aggregate.overall_score,
            combined_flags: aggregate.combined_flags,
            explanation,
            per_modality,
            elapsed_ms,
        };

        tracing::info!(
            request_id = %request_id,
            verdict = %decision.verdict,
            overall_score = ?decision.overall_score,
            flag_count = decision.combined_flags.len(),
            unavailable = decision.unavailable_count(),
            elapsed_ms,
            "Moderation complete"
        );

        Ok(decision)
    }

    /// Verdict and explanation for one modality on its own.
    ///
    /// Used for the nested per-modality entries of multimodal responses;
    /// the binding verdict is the one in [`Decision`].
    pub fn assess_modality(
        &self,
        modality: Modality,
        outcome: Option<&ModalityOutcome>,
    ) -> Assessment {
        let mut single = BTreeMap::new();
        single.insert(modality, outcome.cloned());
        let aggregate = Aggregate::from_outcomes(&single);
        self.decision_engine
            .assess(aggregate.overall_score, &aggregate.combined_flags, &single)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{RawResult, Verdict};
    use crate::engine::chain::testing::*;
    use crate::engine::chain::ProviderChain;
    use crate::engine::ALL_UNAVAILABLE;

    struct Chains {
        text: Vec<(&'static str, Arc<ScriptedProvider>)>,
        image: Vec<(&'static str, Arc<ScriptedProvider>)>,
        audio: Vec<(&'static str, Arc<ScriptedProvider>)>,
    }

    fn build(chains: &Chains) -> MultimodalCombiner {
        let make = |modality, list: &Vec<(&'static str, Arc<ScriptedProvider>)>| {
            let entries: Vec<(&str, &Arc<ScriptedProvider>)> =
                list.iter().map(|(n, p)| (*n, p)).collect();
            chain(modality, &entries)
        };
        let registry = ProviderRegistry::new(
            make(Modality::Text, &chains.text),
            make(Modality::Image, &chains.image),
            make(Modality::Audio, &chains.audio),
        )
        .unwrap();

        MultimodalCombiner::from_config(&registry, &Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_single_text_allowed() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(95.0, &[]))],
            image: vec![],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("Thank you for your support!"))
            .await
            .unwrap();

        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.overall_score, Some(95.0));
        assert!(decision.combined_flags.is_empty());
        assert_eq!(decision.per_modality.len(), 1);
        assert_eq!(decision.outcome(Modality::Text).unwrap().result.provider, "cloud");
    }

    #[tokio::test]
    async fn test_failed_image_excluded_from_aggregation() {
        let image_a = ScriptedProvider::failing();
        let image_b = ScriptedProvider::failing();
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(90.0, &[]))],
            image: vec![("rekognition", image_a.clone()), ("opencv", image_b.clone())],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("nice photo").with_image(b"not-decodable".to_vec()))
            .await
            .unwrap();

        assert_eq!(image_a.calls(), 1);
        assert_eq!(image_b.calls(), 1);
        assert!(decision.per_modality.contains_key(&Modality::Image));
        assert!(decision.outcome(Modality::Image).is_none());
        assert_eq!(decision.overall_score, Some(90.0));
        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(decision.explanation.contains("unavailable: image"));
    }

    #[tokio::test]
    async fn test_worst_modality_dominates() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(90.0, &[]))],
            image: vec![("vision", ScriptedProvider::ok(55.0, &["Suggestive"]))],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello").with_image(b"img".to_vec()))
            .await
            .unwrap();

        assert_eq!(decision.overall_score, Some(55.0));
        assert_eq!(decision.verdict, Verdict::Flag);
    }

    #[tokio::test]
    async fn test_low_image_score_escalates() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(90.0, &[]))],
            image: vec![("vision", ScriptedProvider::ok(35.0, &[]))],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello").with_image(b"img".to_vec()))
            .await
            .unwrap();

        assert_eq!(decision.overall_score, Some(35.0));
        assert_eq!(decision.verdict, Verdict::Escalate);
    }

    #[tokio::test]
    async fn test_flag_union_is_case_insensitive() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(80.0, &["Hate", "spam"]))],
            image: vec![],
            audio: vec![("whisper", ScriptedProvider::ok(75.0, &["HATE", "profanity"]))],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello").with_audio(vec![0; 8]))
            .await
            .unwrap();

        let flags: Vec<&str> = decision.combined_flags.iter().map(String::as_str).collect();
        assert_eq!(flags, vec!["hate", "profanity", "spam"]);
    }

    #[tokio::test]
    async fn test_critical_flag_escalates_high_score() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(95.0, &["terrorism"]))],
            image: vec![],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello"))
            .await
            .unwrap();

        assert_eq!(decision.verdict, Verdict::Escalate);
    }

    #[tokio::test]
    async fn test_every_modality_unavailable_escalates() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::failing())],
            image: vec![("vision", ScriptedProvider::failing())],
            audio: vec![],
        });

        let decision = combiner
            .moderate(
                ModerationRequest::text("hello")
                    .with_image(b"img".to_vec())
                    .with_audio(vec![1]),
            )
            .await
            .unwrap();

        assert_eq!(decision.verdict, Verdict::Escalate);
        assert_eq!(decision.overall_score, None);
        assert_eq!(decision.explanation, ALL_UNAVAILABLE);
        assert_eq!(decision.unavailable_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_request_is_invalid() {
        let combiner = build(&Chains {
            text: vec![],
            image: vec![],
            audio: vec![],
        });

        let result = combiner.moderate(ModerationRequest::default()).await;
        assert!(matches!(result, Err(ModerationError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_panicking_provider_falls_back() {
        crate::logging::init_test();
        let fallback = ScriptedProvider::ok(95.0, &[]);
        let combiner = build(&Chains {
            text: vec![
                ("broken", ScriptedProvider::new(Script::Panic)),
                ("lexicon", fallback.clone()),
            ],
            image: vec![],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello"))
            .await
            .unwrap();

        assert_eq!(fallback.calls(), 1);
        assert_eq!(decision.verdict, Verdict::Allow);
        let outcome = decision.outcome(Modality::Text).unwrap();
        assert_eq!(outcome.result.provider, "lexicon");
        assert_eq!(outcome.result.skipped, 1);
    }

    #[tokio::test]
    async fn test_panicking_only_provider_degrades_modality() {
        let combiner = build(&Chains {
            text: vec![("cloud", ScriptedProvider::ok(85.0, &[]))],
            image: vec![("broken", ScriptedProvider::new(Script::Panic))],
            audio: vec![],
        });

        let decision = combiner
            .moderate(ModerationRequest::text("hello").with_image(b"img".to_vec()))
            .await
            .unwrap();

        assert!(decision.outcome(Modality::Image).is_none());
        assert_eq!(decision.verdict, Verdict::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_modalities_run_concurrently() {
        let slow = |score| {
            ScriptedProvider::new(Script::Sleep(
                Duration::from_millis(300),
                RawResult::new(score, vec![]),
            ))
        };
        let combiner = build(&Chains {
            text: vec![("cloud", slow(90.0))],
            image: vec![("vision", slow(80.0))],
            audio: vec![("whisper", slow(85.0))],
        });

        let started = tokio::time::Instant::now();
        let decision = combiner
            .moderate(
                ModerationRequest::text("hello")
                    .with_image(b"img".to_vec())
                    .with_audio(vec![1]),
            )
            .await
            .unwrap();

        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_request_cancels_provider_calls() {
        let slow = ScriptedProvider::new(Script::Sleep(
            Duration::from_millis(200),
            RawResult::new(90.0, vec![]),
        ));
        let combiner = build(&Chains {
            text: vec![("cloud", slow.clone())],
            image: vec![],
            audio: vec![],
        });

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            combiner.moderate(ModerationRequest::text("hello")),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(slow.calls(), 1);
        assert_eq!(slow.completed(), 0);
    }

    #[test]
    fn test_missing_pipeline_rejected() {
        let text = TieredPipeline::new(
            ModalityAnalyzer::new(
                ProviderChain::new(Modality::Text, Vec::new(), Duration::from_secs(1)).unwrap(),
            ),
            DecisionPolicy::default(),
        );
        let result = MultimodalCombiner::new(vec![text], DecisionEngine::default());
        assert!(matches!(result, Err(ModerationError::Config(_))));
    }

    #[test]
    fn test_aggregate_ignores_unavailable() {
        let mut per_modality = BTreeMap::new();
        per_modality.insert(Modality::Text, None);
        let aggregate = Aggregate::from_outcomes(&per_modality);
        assert_eq!(aggregate.overall_score, None);
        assert!(aggregate.combined_flags.is_empty());
    }
}
