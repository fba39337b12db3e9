//! Provider Chain - ordered fallback over interchangeable providers.
//!
//! Providers are tried strictly in registration order. The first one to
//! return a well-formed result wins and later providers are never called.
//! Every call starts again from the top of the chain; there is no memory
//! of earlier failures.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;

use crate::domain::{Modality, Payload, RawResult};
use crate::error::{ChainExhaustedError, ModerationError, ModerationResult, ProviderError};

/// Trait for analysis providers.
///
/// Implementations range from cloud classifiers to local heuristics. A
/// provider never decides anything; it only scores the payload.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Score the payload.
    async fn invoke(&self, payload: &Payload) -> Result<RawResult, ProviderError>;
}

/// A named provider registered for one modality.
#[derive(Clone)]
pub struct ProviderHandle {
    name: String,
    capability: Modality,
    provider: Arc<dyn ModerationProvider>,
    /// Overrides the chain's per-attempt timeout.
    timeout: Option<Duration>,
}

impl ProviderHandle {
    pub fn new(
        name: impl Into<String>,
        capability: Modality,
        provider: Arc<dyn ModerationProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            capability,
            provider,
            timeout: None,
        }
    }

    /// Give this provider its own attempt budget, for providers that
    /// chain further calls of their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A successful chain resolution with its provenance.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub raw: RawResult,
    pub provider: String,
    /// Number of higher-priority providers that failed first.
    pub skipped: usize,
    pub latency_ms: u64,
}

/// Immutable ordered list of providers for one modality.
#[derive(Debug, Clone)]
pub struct ProviderChain {
    modality: Modality,
    handles: Vec<ProviderHandle>,
    timeout: Duration,
}

impl ProviderChain {
    /// Build a chain; every handle must be registered for `modality`.
    pub fn new(
        modality: Modality,
        handles: Vec<ProviderHandle>,
        timeout: Duration,
    ) -> ModerationResult<Self> {
        if let Some(wrong) = handles.iter().find(|h| h.capability != modality) {
            return Err(ModerationError::Config(format!(
                "provider '{}' serves {} but was registered in the {} chain",
                wrong.name, wrong.capability, modality
            )));
        }

        Ok(Self {
            modality,
            handles,
            timeout,
        })
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name.clone()).collect()
    }

    /// Resolve the payload against the chain.
    ///
    /// Each attempt gets the full per-provider timeout. A timeout, an error,
    /// a panic or a malformed result all advance to the next provider.
    pub async fn resolve(&self, payload: &Payload) -> Result<Resolved, ChainExhaustedError> {
        let mut attempts: Vec<(String, ProviderError)> = Vec::new();

        for handle in &self.handles {
            let started = Instant::now();
            let outcome = self.attempt(handle, payload).await.and_then(check_well_formed);
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(mut raw) => {
                    let skipped = attempts.len();
                    if skipped > 0 {
                        tracing::info!(
                            modality = %self.modality,
                            provider = %handle.name,
                            skipped,
                            latency_ms,
                            "Fallback provider answered"
                        );
                    } else {
                        tracing::debug!(
                            modality = %self.modality,
                            provider = %handle.name,
                            latency_ms,
                            "Primary provider answered"
                        );
                    }
                    let provider = raw.provenance.take().unwrap_or_else(|| handle.name.clone());
                    return Ok(Resolved {
                        raw,
                        provider,
                        skipped,
                        latency_ms,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        modality = %self.modality,
                        provider = %handle.name,
                        error = %error,
                        latency_ms,
                        "Provider failed, advancing chain"
                    );
                    attempts.push((handle.name.clone(), error));
                }
            }
        }

        Err(ChainExhaustedError {
            modality: self.modality,
            attempts,
        })
    }

    /// One provider call, bounded by its timeout. A panicking provider is a
    /// failed attempt like any other.
    async fn attempt(
        &self,
        handle: &ProviderHandle,
        payload: &Payload,
    ) -> Result<RawResult, ProviderError> {
        let timeout = handle.timeout.unwrap_or(self.timeout);
        let call = AssertUnwindSafe(handle.provider.invoke(payload)).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ProviderError::Unavailable(format!(
                "provider panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// A result is unusable when its numbers are not finite.
fn check_well_formed(raw: RawResult) -> Result<RawResult, ProviderError> {
    if !raw.score.is_finite() {
        return Err(ProviderError::Malformed(format!(
            "score is not a finite number: {}",
            raw.score
        )));
    }
    if let Some(confidence) = raw.confidence {
        if !confidence.is_finite() {
            return Err(ProviderError::Malformed(format!(
                "confidence is not a finite number: {}",
                confidence
            )));
        }
    }
    Ok(raw)
}

/// Read-only provider chains for every modality, built once at startup.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    text: ProviderChain,
    image: ProviderChain,
    audio: ProviderChain,
}

impl ProviderRegistry {
    pub fn new(
        text: ProviderChain,
        image: ProviderChain,
        audio: ProviderChain,
    ) -> ModerationResult<Self> {
        for (expected, chain) in [
            (Modality::Text, &text),
            (Modality::Image, &image),
            (Modality::Audio, &audio),
        ] {
            if chain.modality != expected {
                return Err(ModerationError::Config(format!(
                    "{} chain passed where the {} chain was expected",
                    chain.modality, expected
                )));
            }
        }
        Ok(Self { text, image, audio })
    }

    pub fn chain(&self, modality: Modality) -> &ProviderChain {
        match modality {
            Modality::Text => &self.text,
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }

    /// Resolve a payload against the chain registered for `modality`.
    pub async fn resolve(
        &self,
        modality: Modality,
        payload: &Payload,
    ) -> Result<Resolved, ChainExhaustedError> {
        self.chain(modality).resolve(payload).await
    }
}
