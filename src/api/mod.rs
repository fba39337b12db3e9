//! HTTP API layer.
//!
//! Thin adapter over the moderation engine: parses uploads, runs the
//! combiner and shapes its decision into JSON.

pub mod handlers;
mod routes;
mod types;

pub use routes::build_router;
