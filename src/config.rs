//! Configuration module for the moderation service.
//!
//! Loads configuration from YAML files and environment variables. Every
//! section has built-in defaults so the service starts with no files.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub moderation: ModerationConfig,
    pub prefilter: PrefilterConfig,
    pub providers: ProvidersConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on request bodies, media uploads included.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Decision policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Scores at or above this are allowed.
    pub safe_threshold: f64,
    /// Scores at or above this (and below `safe_threshold`) are flagged.
    pub flag_threshold: f64,
    /// Flags that force escalation regardless of score.
    pub critical_flags: Vec<String>,
    /// Timeout applied to each individual provider attempt.
    pub provider_timeout_ms: u64,
    /// Confidence assumed when a provider reports none.
    pub default_confidence: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            safe_threshold: 70.0,
            flag_threshold: 40.0,
            critical_flags: vec![
                "child_abuse".to_string(),
                "child_exploitation".to_string(),
                "terrorism".to_string(),
                "self_harm".to_string(),
            ],
            provider_timeout_ms: 8_000,
            default_confidence: 0.5,
        }
    }
}

/// Tier 1 prefilter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    pub enabled: bool,
    /// Offensive keywords scanned in text.
    pub text_keywords: Vec<String>,
    /// Distinct keyword hits that count as a violation.
    pub text_min_hits: usize,
    /// Skin-tone pixel ratio above which an image is a violation.
    pub skin_ratio_threshold: f64,
    /// Skin-tone pixel ratio above which an image is only suspicious.
    pub skin_suspicious_ratio: f64,
    /// Score assigned to content the prefilter rejects.
    pub forced_score: f64,
    /// Confidence assigned to content the prefilter rejects.
    pub confidence: f64,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text_keywords: [
                "hate",
                "kill",
                "violence",
                "attack",
                "terrorist",
                "abuse",
                "threat",
                "bomb",
                "weapon",
                "murder",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            text_min_hits: 3,
            skin_ratio_threshold: 0.5,
            skin_suspicious_ratio: 0.3,
            forced_score: 10.0,
            confidence: 0.9,
        }
    }
}

/// Ordered provider chains, one per modality. List order is chain priority.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub text: Vec<ProviderEntry>,
    pub image: Vec<ProviderEntry>,
    pub audio: Vec<ProviderEntry>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            text: vec![
                ProviderEntry::new(ProviderKind::LlamaGuard(LlmProviderConfig::default())),
                ProviderEntry::new(ProviderKind::Lexicon(LexiconProviderConfig::default())),
            ],
            image: vec![ProviderEntry::new(ProviderKind::SkinTone(
                SkinToneProviderConfig::default(),
            ))],
            audio: vec![ProviderEntry {
                name: Some("whisper".to_string()),
                enabled: true,
                kind: ProviderKind::Transcribe(HttpProviderConfig {
                    url: "http://localhost:9000/v1/transcribe".to_string(),
                    bearer_token: None,
                }),
            }],
        }
    }
}

/// One entry of a provider chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    /// Name used for provenance; defaults to the provider kind.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

impl ProviderEntry {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: None,
            enabled: true,
            kind,
        }
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.kind_name().to_string())
    }
}

fn default_true() -> bool {
    true
}

/// Provider adapter selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// Llama Guard safety classifier over a chat-completions endpoint.
    LlamaGuard(LlmProviderConfig),
    /// General LLM prompted for a 0-100 safety rating.
    LlmRating(LlmProviderConfig),
    /// Remote analyzer speaking the `{score, flags, confidence?, extras?}` contract.
    Http(HttpProviderConfig),
    /// Local keyword-density text scorer.
    Lexicon(LexiconProviderConfig),
    /// Local skin-tone ratio image scorer.
    SkinTone(SkinToneProviderConfig),
    /// Remote speech-to-text; the transcript is scored by the text chain.
    Transcribe(HttpProviderConfig),
}

impl ProviderKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProviderKind::LlamaGuard(_) => "llama_guard",
            ProviderKind::LlmRating(_) => "llm_rating",
            ProviderKind::Http(_) => "http",
            ProviderKind::Lexicon(_) => "lexicon",
            ProviderKind::SkinTone(_) => "skin_tone",
            ProviderKind::Transcribe(_) => "transcribe",
        }
    }
}

/// Chat-completions endpoint settings shared by the LLM-backed providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// API key; when empty, read from `api_key_env`.
    pub api_key: String,
    pub api_key_env: String,
    /// Model identifier; each provider kind has its own default.
    pub model: Option<String>,
    pub endpoint: String,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: None,
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
        }
    }
}

impl LlmProviderConfig {
    /// Configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpProviderConfig {
    pub url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LexiconProviderConfig {
    /// Extra `term -> category` entries on top of the built-in lexicon.
    pub extra_terms: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkinToneProviderConfig {
    pub suspicious_ratio: f64,
    pub explicit_ratio: f64,
}

impl Default for SkinToneProviderConfig {
    fn default() -> Self {
        Self {
            suspicious_ratio: 0.3,
            explicit_ratio: 0.5,
        }
    }
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (MODERATION__*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml (if exists)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("MODERATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.moderation;
        if !(0.0 <= m.flag_threshold
            && m.flag_threshold < m.safe_threshold
            && m.safe_threshold <= 100.0)
        {
            return Err(ConfigError::Message(format!(
                "thresholds must satisfy 0 <= flag_threshold ({}) < safe_threshold ({}) <= 100",
                m.flag_threshold, m.safe_threshold
            )));
        }
        if m.provider_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "provider_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&m.default_confidence) {
            return Err(ConfigError::Message(format!(
                "default_confidence {} must be within 0..=1",
                m.default_confidence
            )));
        }
        let p = &self.prefilter;
        if !(0.0..=1.0).contains(&p.confidence) || !(0.0..=100.0).contains(&p.forced_score) {
            return Err(ConfigError::Message(
                "prefilter confidence must be within 0..=1 and forced_score within 0..=100"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_moderation_config() {
        let config = ModerationConfig::default();
        assert_eq!(config.safe_threshold, 70.0);
        assert_eq!(config.flag_threshold, 40.0);
        assert_eq!(config.default_confidence, 0.5);
        assert!(config.critical_flags.contains(&"terrorism".to_string()));
    }

    #[test]
    fn test_defaults_are_valid() {
        tokio_test::assert_ok!(Config::default().validate());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = Config::default();
        config.moderation.flag_threshold = 80.0;
        tokio_test::assert_err!(config.validate());

        let mut config = Config::default();
        config.moderation.provider_timeout_ms = 0;
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_default_chains() {
        let providers = ProvidersConfig::default();
        let text: Vec<String> = providers.text.iter().map(ProviderEntry::name).collect();
        assert_eq!(text, vec!["llama_guard", "lexicon"]);
        assert_eq!(providers.image[0].name(), "skin_tone");
        assert_eq!(providers.audio[0].name(), "whisper");
        assert!(matches!(providers.audio[0].kind, ProviderKind::Transcribe(_)));
    }

    #[test]
    fn test_provider_entry_deserializes_tagged_kind() {
        let entry: ProviderEntry = serde_json::from_value(serde_json::json!({
            "name": "transcribe",
            "kind": "http",
            "url": "http://localhost:9000/analyze",
        }))
        .unwrap();

        assert!(entry.enabled);
        assert_eq!(entry.name(), "transcribe");
        assert!(matches!(entry.kind, ProviderKind::Http(ref c) if c.url.ends_with("/analyze")));
    }

    #[test]
    fn test_disabled_entry() {
        let entry: ProviderEntry = serde_json::from_value(serde_json::json!({
            "kind": "lexicon",
            "enabled": false,
        }))
        .unwrap();

        assert!(!entry.enabled);
        assert_eq!(entry.name(), "lexicon");
    }

    #[test]
    fn test_shipped_default_yaml_loads() {
        let config: Config = ConfigLoader::builder()
            .add_source(File::from_str(
                include_str!("../config/default.yaml"),
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.max_body_bytes, 25 * 1024 * 1024);
        assert_eq!(config.prefilter.text_keywords.len(), 10);
        assert_eq!(config.providers.text.len(), 3);
        assert!(!config.providers.text[1].enabled);
        assert_eq!(config.providers.image[0].name(), "vision");
        assert_eq!(config.providers.audio[0].name(), "whisper");
        assert!(matches!(config.providers.audio[0].kind, ProviderKind::Transcribe(_)));
        assert!(!config.providers.audio[1].enabled);
    }
}
