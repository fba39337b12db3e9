//! Moderation engine.
//!
//! This module contains the layered moderation pipeline:
//! - Provider Chain: ordered fallback over interchangeable providers
//! - Modality Analyzer: normalizes provider output per modality
//! - Prefilter: fast heuristics that can decide a modality alone
//! - Tiered Pipeline: prefilter, deep analysis, classification
//! - Decision Engine: thresholds and critical flags
//! - Multimodal Combiner: concurrent fan-out and conservative aggregation

mod analyzer;
mod chain;
mod combiner;
mod decision;
mod pipeline;
mod prefilter;

pub use analyzer::*;
pub use chain::*;
pub use combiner::*;
pub use decision::*;
pub use pipeline::*;
pub use prefilter::*;

#[cfg(test)]
pub(crate) use chain::testing;
#[cfg(test)]
pub(crate) use prefilter::fixtures;
