//! Error types for the moderation service.
//!
//! `ProviderError` and `ChainExhaustedError` stay inside the engine; the
//! only errors that reach HTTP clients are [`ModerationError`] variants.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::Modality;

/// A single provider call that did not produce a usable result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed result: {0}")]
    Malformed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Every provider in a modality's chain failed.
#[derive(Debug, Clone, Error)]
#[error("all {} provider(s) for {modality} failed", attempts.len())]
pub struct ChainExhaustedError {
    pub modality: Modality,
    /// Provider name and error, in chain order.
    pub attempts: Vec<(String, ProviderError)>,
}

/// Unified error type for service operations.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response body for API clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ModerationError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                msg.clone(),
                None,
            ),
            ModerationError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            ModerationError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Configuration error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for moderation operations.
pub type ModerationResult<T> = Result<T, ModerationError>;
