//! Content modalities and the moderation request.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ModerationError, ModerationResult};

/// One kind of content inside a moderation request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Modality {
    /// All modalities, in the order they are reported.
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Image, Modality::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "image" => Ok(Modality::Image),
            "audio" => Ok(Modality::Audio),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

/// The content handed to a provider or prefilter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

/// A request carrying any subset of text, image and audio content.
///
/// At least one modality must be present; [`ModerationRequest::validate`]
/// rejects empty requests.
#[derive(Debug, Clone, Default)]
pub struct ModerationRequest {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    pub audio: Option<Vec<u8>>,
}

impl ModerationRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            image: Some(bytes),
            ..Default::default()
        }
    }

    pub fn audio(bytes: Vec<u8>) -> Self {
        Self {
            audio: Some(bytes),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn with_audio(mut self, bytes: Vec<u8>) -> Self {
        self.audio = Some(bytes);
        self
    }

    /// Modalities present in this request.
    pub fn modalities(&self) -> Vec<Modality> {
        let mut present = Vec::with_capacity(3);
        if self.text.is_some() {
            present.push(Modality::Text);
        }
        if self.image.is_some() {
            present.push(Modality::Image);
        }
        if self.audio.is_some() {
            present.push(Modality::Audio);
        }
        present
    }

    pub fn validate(&self) -> ModerationResult<()> {
        if self.modalities().is_empty() {
            return Err(ModerationError::InvalidRequest(
                "At least one content type (text, image, or audio) is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Split the request into one owned payload per present modality.
    pub fn into_payloads(self) -> Vec<(Modality, Payload)> {
        let mut payloads = Vec::with_capacity(3);
        if let Some(text) = self.text {
            payloads.push((Modality::Text, Payload::Text(text)));
        }
        if let Some(image) = self.image {
            payloads.push((Modality::Image, Payload::Binary(image)));
        }
        if let Some(audio) = self.audio {
            payloads.push((Modality::Audio, Payload::Binary(audio)));
        }
        payloads
    }
}
