//! HTTP request handlers.

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::api::types::*;
use crate::domain::{Modality, ModerationRequest};
use crate::error::{ModerationError, ModerationResult};
use crate::AppState;

/// Moderate a piece of text.
///
/// POST /v1/moderation/text
#[utoipa::path(
    post,
    path = "/v1/moderation/text",
    request_body = TextModerationRequest,
    responses(
        (status = 200, description = "Analysis complete", body = ModalityResponse),
        (status = 400, description = "Invalid request")
    ),
    tag = "moderation"
)]
pub async fn moderate_text(
    State(state): State<AppState>,
    Json(request): Json<TextModerationRequest>,
) -> ModerationResult<Json<ModalityResponse>> {
    if request.text.trim().is_empty() {
        return Err(ModerationError::InvalidRequest(
            "text must not be empty".to_string(),
        ));
    }

    moderate_single(&state, ModerationRequest::text(request.text), Modality::Text).await
}

/// Moderate an uploaded image.
///
/// POST /v1/moderation/image
#[utoipa::path(
    post,
    path = "/v1/moderation/image",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Analysis complete", body = ModalityResponse),
        (status = 400, description = "Missing or unreadable image field")
    ),
    tag = "moderation"
)]
pub async fn moderate_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ModerationResult<Json<ModalityResponse>> {
    let form = read_form(multipart).await?;
    let image = form.image.ok_or_else(|| missing_field("image"))?;

    moderate_single(&state, ModerationRequest::image(image), Modality::Image).await
}

/// Moderate an uploaded audio clip.
///
/// POST /v1/moderation/audio
#[utoipa::path(
    post,
    path = "/v1/moderation/audio",
    request_body(content = AudioUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Analysis complete", body = ModalityResponse),
        (status = 400, description = "Missing or unreadable audio field")
    ),
    tag = "moderation"
)]
pub async fn moderate_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ModerationResult<Json<ModalityResponse>> {
    let form = read_form(multipart).await?;
    let audio = form.audio.ok_or_else(|| missing_field("audio"))?;

    moderate_single(&state, ModerationRequest::audio(audio), Modality::Audio).await
}

/// Moderate any combination of text, image and audio.
///
/// POST /v1/moderation/multimodal
#[utoipa::path(
    post,
    path = "/v1/moderation/multimodal",
    request_body(content = MultimodalUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Analysis complete", body = MultimodalResponse),
        (status = 400, description = "No content submitted")
    ),
    tag = "moderation"
)]
pub async fn moderate_multimodal(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ModerationResult<Json<MultimodalResponse>> {
    let request = read_form(multipart).await?;

    tracing::info!(modalities = ?request.modalities(), "Moderating multimodal content");

    let decision = state.combiner.moderate(request).await?;

    let results = decision
        .per_modality
        .iter()
        .map(|(modality, outcome)| {
            let entry = outcome.as_ref().map(|outcome| {
                ModalityResponse::new(
                    state.combiner.assess_modality(*modality, Some(outcome)),
                    Some(outcome),
                    outcome.result.latency_ms,
                )
            });
            (modality.to_string(), entry)
        })
        .collect();

    Ok(Json(MultimodalResponse {
        request_id: decision.request_id,
        decision: decision.verdict,
        overall_safety_score: decision.overall_score,
        combined_flags: decision.combined_flags.iter().cloned().collect(),
        explanation: decision.explanation,
        results,
        processing_time_ms: decision.elapsed_ms,
    }))
}

/// Health check endpoint.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: ProviderChains {
            text: state.combiner.provider_names(Modality::Text),
            image: state.combiner.provider_names(Modality::Image),
            audio: state.combiner.provider_names(Modality::Audio),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn moderate_single(
    state: &AppState,
    request: ModerationRequest,
    modality: Modality,
) -> ModerationResult<Json<ModalityResponse>> {
    tracing::info!(modality = %modality, "Moderating content");

    let decision = state.combiner.moderate(request).await?;

    Ok(Json(ModalityResponse::from_decision(&decision, modality)))
}

/// Collect `text`, `image` and `audio` fields; empty fields count as absent.
async fn read_form(mut multipart: Multipart) -> ModerationResult<ModerationRequest> {
    let mut request = ModerationRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ModerationError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => {
                let text = field.text().await.map_err(|e| {
                    ModerationError::BadRequest(format!("unreadable text field: {}", e))
                })?;
                if !text.trim().is_empty() {
                    request = request.with_text(text);
                }
            }
            "image" | "audio" => {
                let bytes = field.bytes().await.map_err(|e| {
                    ModerationError::BadRequest(format!("unreadable {} field: {}", name, e))
                })?;
                if bytes.is_empty() {
                    continue;
                }
                request = if name == "image" {
                    request.with_image(bytes.to_vec())
                } else {
                    request.with_audio(bytes.to_vec())
                };
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(request)
}

fn missing_field(name: &str) -> ModerationError {
    ModerationError::InvalidRequest(format!("multipart field '{}' is required", name))
}
