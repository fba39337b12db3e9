//! Concrete analysis providers.
//!
//! Each adapter implements [`ModerationProvider`] and is wrapped into a
//! [`ProviderHandle`] once at startup by [`build_registry`].

mod http;
mod lexicon;
mod llama_guard;
mod llm_rating;
mod openrouter;
mod skin_tone;
mod transcribe;

pub use http::HttpProvider;
pub use lexicon::LexiconProvider;
pub use llama_guard::LlamaGuardProvider;
pub use llm_rating::LlmRatingProvider;
pub use skin_tone::SkinToneProvider;
pub use transcribe::TranscribeProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmProviderConfig, ProviderEntry, ProviderKind, ProvidersConfig};
use crate::domain::Modality;
use crate::engine::{ModerationProvider, ProviderChain, ProviderHandle, ProviderRegistry};
use crate::error::{ModerationError, ModerationResult};

/// Build the read-only registry from configuration.
///
/// Disabled entries and LLM entries without an API key are skipped. An
/// empty chain is allowed; that modality always reports unavailable. The
/// text chain is built first because transcription scores through it.
pub fn build_registry(
    providers: &ProvidersConfig,
    timeout: Duration,
) -> ModerationResult<ProviderRegistry> {
    let text = build_chain(Modality::Text, &providers.text, timeout, None)?;
    let image = build_chain(Modality::Image, &providers.image, timeout, Some(&text))?;
    let audio = build_chain(Modality::Audio, &providers.audio, timeout, Some(&text))?;
    ProviderRegistry::new(text, image, audio)
}

fn build_chain(
    modality: Modality,
    entries: &[ProviderEntry],
    timeout: Duration,
    text_chain: Option<&ProviderChain>,
) -> ModerationResult<ProviderChain> {
    let mut handles = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = entry.name();
        if !entry.enabled {
            tracing::info!(modality = %modality, provider = %name, "Provider disabled, skipping");
            continue;
        }

        let Some(handle) = build_handle(modality, entry, timeout, text_chain)? else {
            continue;
        };

        tracing::info!(
            modality = %modality,
            provider = %name,
            kind = entry.kind.kind_name(),
            priority = handles.len(),
            "Provider registered"
        );
        handles.push(handle);
    }

    if handles.is_empty() {
        tracing::warn!(
            modality = %modality,
            "No providers configured, modality will always be unavailable"
        );
    }

    ProviderChain::new(modality, handles, timeout)
}

fn build_handle(
    modality: Modality,
    entry: &ProviderEntry,
    timeout: Duration,
    text_chain: Option<&ProviderChain>,
) -> ModerationResult<Option<ProviderHandle>> {
    let name = entry.name();
    let only = |kind: &str, served: Modality| -> ModerationResult<()> {
        if modality == served {
            Ok(())
        } else {
            Err(ModerationError::Config(format!(
                "provider '{}' of kind {} only scores {}, not {}",
                name, kind, served, modality
            )))
        }
    };

    let api_key = |config: &LlmProviderConfig| {
        let key = config.resolve_api_key();
        if key.is_none() {
            tracing::warn!(
                modality = %modality,
                provider = %name,
                api_key_env = %config.api_key_env,
                "No API key for provider, skipping"
            );
        }
        key
    };

    let provider: Arc<dyn ModerationProvider> = match &entry.kind {
        ProviderKind::LlamaGuard(config) => {
            only("llama_guard", Modality::Text)?;
            let Some(key) = api_key(config) else {
                return Ok(None);
            };
            Arc::new(LlamaGuardProvider::new(config, key, timeout)?)
        }
        ProviderKind::LlmRating(config) => {
            only("llm_rating", Modality::Text)?;
            let Some(key) = api_key(config) else {
                return Ok(None);
            };
            Arc::new(LlmRatingProvider::new(config, key, timeout)?)
        }
        ProviderKind::Http(config) => Arc::new(HttpProvider::new(config, timeout)?),
        ProviderKind::Lexicon(config) => {
            only("lexicon", Modality::Text)?;
            Arc::new(LexiconProvider::from(config))
        }
        ProviderKind::SkinTone(config) => {
            only("skin_tone", Modality::Image)?;
            Arc::new(SkinToneProvider::from(config))
        }
        ProviderKind::Transcribe(config) => {
            only("transcribe", Modality::Audio)?;
            let Some(text_chain) = text_chain else {
                return Err(ModerationError::Config(format!(
                    "provider '{}' needs the text chain to score transcripts",
                    name
                )));
            };
            let provider = TranscribeProvider::new(&name, config, text_chain.clone(), timeout)?;
            let budget = provider.attempt_budget(timeout);
            return Ok(Some(
                ProviderHandle::new(name, modality, Arc::new(provider)).with_timeout(budget),
            ));
        }
    };

    Ok(Some(ProviderHandle::new(name, modality, provider)))
}

/// Shared reqwest client with the per-attempt timeout as a backstop.
fn http_client(timeout: Duration) -> ModerationResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModerationError::Config(format!("failed to build HTTP client: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpProviderConfig, LexiconProviderConfig, SkinToneProviderConfig};
    use crate::domain::Payload;

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[test]
    fn test_default_registry() {
        let mut providers = ProvidersConfig::default();
        // Keep the test independent of the environment.
        for entry in &mut providers.text {
            if let ProviderKind::LlamaGuard(config) = &mut entry.kind {
                config.api_key_env = "MODERATION_TEST_UNSET_KEY".to_string();
            }
        }

        let registry = build_registry(&providers, timeout()).unwrap();
        assert_eq!(registry.chain(Modality::Text).provider_names(), vec!["lexicon"]);
        assert_eq!(registry.chain(Modality::Image).provider_names(), vec!["skin_tone"]);
        assert_eq!(registry.chain(Modality::Audio).provider_names(), vec!["whisper"]);
    }

    #[test]
    fn test_order_and_names_follow_config() {
        let mut first = ProviderEntry::new(ProviderKind::LlamaGuard(LlmProviderConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        }));
        first.name = Some("guard".to_string());
        let mut disabled = ProviderEntry::new(ProviderKind::Lexicon(LexiconProviderConfig::default()));
        disabled.name = Some("off".to_string());
        disabled.enabled = false;
        let last = ProviderEntry::new(ProviderKind::Lexicon(LexiconProviderConfig::default()));

        let providers = ProvidersConfig {
            text: vec![first, disabled, last],
            image: Vec::new(),
            audio: vec![ProviderEntry::new(ProviderKind::Http(HttpProviderConfig {
                url: "http://127.0.0.1:9/transcribe".to_string(),
                bearer_token: None,
            }))],
        };

        let registry = build_registry(&providers, timeout()).unwrap();
        assert_eq!(
            registry.chain(Modality::Text).provider_names(),
            vec!["guard", "lexicon"]
        );
        assert!(registry.chain(Modality::Image).is_empty());
        assert_eq!(registry.chain(Modality::Audio).provider_names(), vec!["http"]);
    }

    #[test]
    fn test_text_only_provider_in_image_chain_rejected() {
        let providers = ProvidersConfig {
            text: Vec::new(),
            image: vec![ProviderEntry::new(ProviderKind::Lexicon(
                LexiconProviderConfig::default(),
            ))],
            audio: Vec::new(),
        };
        let err = build_registry(&providers, timeout()).unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }

    #[test]
    fn test_skin_tone_in_audio_chain_rejected() {
        let providers = ProvidersConfig {
            text: Vec::new(),
            image: Vec::new(),
            audio: vec![ProviderEntry::new(ProviderKind::SkinTone(
                SkinToneProviderConfig::default(),
            ))],
        };
        assert!(build_registry(&providers, timeout()).is_err());
    }

    #[test]
    fn test_transcribe_in_text_chain_rejected() {
        let providers = ProvidersConfig {
            text: vec![ProviderEntry::new(ProviderKind::Transcribe(HttpProviderConfig {
                url: "http://127.0.0.1:9/transcribe".to_string(),
                bearer_token: None,
            }))],
            image: Vec::new(),
            audio: Vec::new(),
        };
        let err = build_registry(&providers, timeout()).unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }

    #[tokio::test]
    async fn test_audio_is_moderated_through_transcript() {
        use axum::{routing::post, Json, Router};
        use serde_json::json;

        let router = Router::new().route(
            "/v1/transcribe",
            post(|| async {
                Json(json!({
                    "text": "this is a terrorist threat",
                    "segments": [{ "start": 0.0, "end": 2.0, "text": "this is a terrorist threat" }],
                    "provider": "whisper"
                }))
            }),
        );
        let base = stub::serve(router).await;

        let mut transcriber = ProviderEntry::new(ProviderKind::Transcribe(HttpProviderConfig {
            url: format!("{}/v1/transcribe", base),
            bearer_token: None,
        }));
        transcriber.name = Some("speech".to_string());
        let providers = ProvidersConfig {
            text: vec![ProviderEntry::new(ProviderKind::Lexicon(
                LexiconProviderConfig::default(),
            ))],
            image: Vec::new(),
            audio: vec![transcriber],
        };

        let registry = build_registry(&providers, timeout()).unwrap();
        let resolved = registry
            .resolve(Modality::Audio, &Payload::Binary(vec![0u8; 16]))
            .await
            .unwrap();

        assert_eq!(resolved.provider, "speech:whisper+text:lexicon");
        assert_eq!(resolved.raw.score, 50.0);
        assert_eq!(resolved.raw.flags, vec!["terrorism", "threat"]);
        let extras = resolved.raw.extras.unwrap();
        assert_eq!(extras["transcript"], "this is a terrorist threat");
        assert_eq!(extras["flagged_segments"][0]["end"], 2.0);
    }

    #[tokio::test]
    async fn test_empty_chain_reports_exhausted() {
        let providers = ProvidersConfig {
            text: Vec::new(),
            image: Vec::new(),
            audio: Vec::new(),
        };
        let registry = build_registry(&providers, timeout()).unwrap();
        let err = registry
            .resolve(Modality::Text, &Payload::Text("hello".to_string()))
            .await
            .unwrap_err();
        assert!(err.attempts.is_empty());
    }
}
