//! Prefilter - the fast first tier of the moderation pipeline.
//!
//! Prefilters are synchronous and never touch the network. A violation
//! decides the modality on the spot; anything else only annotates the
//! result and lets deep analysis run.

use std::collections::BTreeSet;
use std::io::Cursor;

use image::{GenericImageView, ImageReader, Limits};

use crate::domain::{Payload, PrefilterRisk};

/// Outcome of a prefilter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterOutcome {
    /// Nothing of interest found.
    Clear,
    /// Weak signal; deep analysis still runs.
    Suspicious { flags: Vec<String> },
    /// High-confidence violation; deep analysis is skipped.
    Violation { flags: Vec<String> },
    /// The prefilter could not inspect the content.
    Inconclusive,
}

impl PrefilterOutcome {
    pub fn risk(&self) -> PrefilterRisk {
        match self {
            PrefilterOutcome::Clear => PrefilterRisk::Low,
            PrefilterOutcome::Suspicious { .. } => PrefilterRisk::Medium,
            PrefilterOutcome::Violation { .. } => PrefilterRisk::High,
            PrefilterOutcome::Inconclusive => PrefilterRisk::Unknown,
        }
    }
}

/// Trait for prefilter implementations.
pub trait Prefilter: Send + Sync {
    /// Inspect the payload.
    fn check(&self, payload: &Payload) -> PrefilterOutcome;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Keyword prefilter for text.
///
/// Counts distinct offensive keywords; `min_hits` or more is a violation,
/// fewer is suspicious.
pub struct KeywordPrefilter {
    keywords: Vec<String>,
    min_hits: usize,
}

impl KeywordPrefilter {
    pub fn new(keywords: Vec<String>, min_hits: usize) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            keywords,
            min_hits: min_hits.max(1),
        }
    }

    fn matches(&self, text: &str) -> Vec<String> {
        let text_lower = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|kw| text_lower.contains(kw.as_str()))
            .cloned()
            .collect()
    }
}

impl Prefilter for KeywordPrefilter {
    fn check(&self, payload: &Payload) -> PrefilterOutcome {
        let Some(text) = payload.as_text() else {
            return PrefilterOutcome::Inconclusive;
        };

        let hits = self.matches(text);
        if hits.len() >= self.min_hits {
            PrefilterOutcome::Violation { flags: hits }
        } else if !hits.is_empty() {
            PrefilterOutcome::Suspicious { flags: hits }
        } else {
            PrefilterOutcome::Clear
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Skin-tone ratio prefilter for images.
pub struct SkinTonePrefilter {
    violation_ratio: f64,
    suspicious_ratio: f64,
}

impl SkinTonePrefilter {
    pub fn new(violation_ratio: f64, suspicious_ratio: f64) -> Self {
        Self {
            violation_ratio,
            suspicious_ratio: suspicious_ratio.min(violation_ratio),
        }
    }
}

impl Prefilter for SkinTonePrefilter {
    fn check(&self, payload: &Payload) -> PrefilterOutcome {
        let ratio = match skin_tone_ratio(payload.as_bytes()) {
            Ok(ratio) => ratio,
            Err(e) => {
                tracing::debug!(error = %e, "Image prefilter could not decode payload");
                return PrefilterOutcome::Inconclusive;
            }
        };

        if ratio > self.violation_ratio {
            PrefilterOutcome::Violation {
                flags: vec!["high_skin_ratio".to_string()],
            }
        } else if ratio > self.suspicious_ratio {
            PrefilterOutcome::Suspicious {
                flags: vec!["moderate_skin_ratio".to_string()],
            }
        } else {
            PrefilterOutcome::Clear
        }
    }

    fn name(&self) -> &'static str {
        "skin_tone"
    }
}

/// Longest edge the skin-tone scan works on.
const SCAN_EDGE: u32 = 256;

/// Largest image edge accepted for decoding.
pub const MAX_DECODE_EDGE: u32 = 8192;

/// Decoder allocation cap.
const MAX_DECODE_ALLOC: u64 = 128 * 1024 * 1024;

/// Fraction of pixels whose HSV color falls in the skin-tone band.
///
/// The band is hue 0-40 degrees, saturation >= 20/255 and value >= 70/255.
/// Images larger than [`MAX_DECODE_EDGE`] on either side are rejected
/// before their pixels are decoded.
pub fn skin_tone_ratio(bytes: &[u8]) -> Result<f64, image::ImageError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_EDGE);
    limits.max_image_height = Some(MAX_DECODE_EDGE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits);
    let img = reader.decode()?;
    let img = if img.width() > SCAN_EDGE || img.height() > SCAN_EDGE {
        img.thumbnail(SCAN_EDGE, SCAN_EDGE)
    } else {
        img
    };

    let (width, height) = img.dimensions();
    let total = u64::from(width) * u64::from(height);
    if total == 0 {
        return Ok(0.0);
    }

    let skin = img
        .to_rgb8()
        .pixels()
        .filter(|p| is_skin_tone(p[0], p[1], p[2]))
        .count() as u64;

    Ok(skin as f64 / total as f64)
}

fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max < 70 {
        return false;
    }

    let delta = f64::from(max - min);
    let saturation = delta * 255.0 / f64::from(max);
    if saturation < 20.0 {
        return false;
    }

    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let max = f64::from(max);
    let hue = if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    hue <= 40.0
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn default_keywords() -> KeywordPrefilter {
        KeywordPrefilter::new(
            ["hate", "kill", "bomb", "weapon", "murder"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            3,
        )
    }

    #[test]
    fn test_keyword_prefilter_clear() {
        let prefilter = default_keywords();
        let outcome = prefilter.check(&Payload::Text("Thank you for your support!".to_string()));
        assert_eq!(outcome, PrefilterOutcome::Clear);
        assert_eq!(outcome.risk(), PrefilterRisk::Low);
    }

    #[test]
    fn test_keyword_prefilter_suspicious() {
        let prefilter = default_keywords();
        let outcome = prefilter.check(&Payload::Text("I hate Mondays".to_string()));
        assert_eq!(
            outcome,
            PrefilterOutcome::Suspicious {
                flags: vec!["hate".to_string()]
            }
        );
    }

    #[test]
    fn test_keyword_prefilter_violation() {
        let prefilter = default_keywords();
        let outcome = prefilter.check(&Payload::Text(
            "Build a BOMB, grab a weapon and kill them".to_string(),
        ));
        assert_eq!(
            outcome,
            PrefilterOutcome::Violation {
                flags: vec!["bomb".to_string(), "kill".to_string(), "weapon".to_string()]
            }
        );
    }

    #[test]
    fn test_keyword_prefilter_ignores_binary() {
        let prefilter = default_keywords();
        let outcome = prefilter.check(&Payload::Binary(vec![1, 2, 3]));
        assert_eq!(outcome, PrefilterOutcome::Inconclusive);
    }

    #[test]
    fn test_skin_tone_ratio() {
        assert_eq!(skin_tone_ratio(&solid_png(SKIN, 8, 8)).unwrap(), 1.0);
        assert_eq!(skin_tone_ratio(&solid_png(SKY, 8, 8)).unwrap(), 0.0);
    }

    #[test]
    fn test_oversized_image_rejected_before_decode() {
        let wide = solid_png(SKIN, MAX_DECODE_EDGE + 1, 1);
        assert!(matches!(
            skin_tone_ratio(&wide),
            Err(image::ImageError::Limits(_))
        ));

        let prefilter = SkinTonePrefilter::new(0.5, 0.3);
        assert_eq!(
            prefilter.check(&Payload::Binary(wide)),
            PrefilterOutcome::Inconclusive
        );
    }

    #[test]
    fn test_skin_tone_prefilter() {
        let prefilter = SkinTonePrefilter::new(0.5, 0.3);

        let outcome = prefilter.check(&Payload::Binary(solid_png(SKIN, 16, 16)));
        assert_eq!(outcome.risk(), PrefilterRisk::High);

        let outcome = prefilter.check(&Payload::Binary(solid_png(SKY, 16, 16)));
        assert_eq!(outcome, PrefilterOutcome::Clear);
    }

    #[test]
    fn test_undecodable_image_is_inconclusive() {
        let prefilter = SkinTonePrefilter::new(0.5, 0.3);
        let outcome = prefilter.check(&Payload::Binary(b"not an image".to_vec()));
        assert_eq!(outcome, PrefilterOutcome::Inconclusive);
        assert_eq!(outcome.risk(), PrefilterRisk::Unknown);
    }
}
