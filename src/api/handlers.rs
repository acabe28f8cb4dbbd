//! HTTP request handlers for the gateway API.

use crate::api::validation::parse_chat_request;
use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::rate_limiter::{decision_headers, derive_client_id, Endpoint, RateLimiter};
use crate::services::deployments::DeploymentService;
use crate::services::knowledge::KnowledgeSource;
use crate::services::router::ChatRouter;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub rate_limiter: RateLimiter,
    pub router: ChatRouter,
    pub deployments: DeploymentService,
    pub knowledge: Arc<dyn KnowledgeSource>,
}

/// Handle universal chat requests.
///
/// Admission order: rate limit, then schema validation, then dispatch.
/// The rate-limit headers are attached to every response for which a
/// decision was made, allowed or not.
#[tracing::instrument(skip(state, headers, body))]
pub async fn ai_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request_id = generate_request_id();

    REQUEST_ID
        .scope(request_id, async move {
            let client_id = derive_client_id(&headers);
            let decision = state.rate_limiter.check(&client_id, Endpoint::AiChat).await;
            let limit_headers = decision_headers(&decision);

            let result: Result<Response> = if decision.allowed {
                process_chat(&state, body).await
            } else {
                Err(AppError::RateLimited {
                    reset_at_ms: decision.reset_at_ms,
                })
            };

            let mut response = match result {
                Ok(response) => response,
                Err(e) => e.into_response(),
            };
            response.headers_mut().extend(limit_headers);
            response
        })
        .await
}

async fn process_chat(state: &AppState, body: serde_json::Value) -> Result<Response> {
    let request = parse_chat_request(body).map_err(AppError::Validation)?;
    let chat_response = state.router.process(Endpoint::AiChat, request).await?;
    Ok(Json(chat_response).into_response())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return AppError::Internal("Failed to encode metrics".to_string()).into_response();
    }

    (
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
