//! Route definitions for the API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;
use crate::AppState;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::moderate_text,
        handlers::moderate_image,
        handlers::moderate_audio,
        handlers::moderate_multimodal,
        handlers::health_check,
    ),
    components(schemas(
        crate::api::types::TextModerationRequest,
        crate::api::types::ImageUpload,
        crate::api::types::AudioUpload,
        crate::api::types::MultimodalUpload,
        crate::api::types::ModalityResponse,
        crate::api::types::MultimodalResponse,
        crate::api::types::ProviderChains,
        crate::api::types::HealthResponse,
        crate::domain::Verdict,
        crate::domain::ModalityLabel,
        crate::domain::PrefilterRisk,
        crate::error::ErrorResponse,
    )),
    tags(
        (name = "moderation", description = "Content moderation endpoints"),
        (name = "health", description = "Health and status endpoints")
    ),
    info(
        title = "Moderation Core API",
        version = "0.1.0",
        description = "Content moderation decision engine - ALLOW / FLAG / ESCALATE verdicts over text, image and audio",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Build the API router.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Moderation
        .route("/v1/moderation/text", post(handlers::moderate_text))
        .route("/v1/moderation/image", post(handlers::moderate_image))
        .route("/v1/moderation/audio", post(handlers::moderate_audio))
        .route(
            "/v1/moderation/multimodal",
            post(handlers::moderate_multimodal),
        )
        // Health
        .route("/v1/health", get(handlers::health_check))
        .with_state(state)
        // OpenAPI docs
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
