//! Deployment-scoped chat endpoint.
//!
//! A thin orchestration layer: load the deployment configuration, merge a
//! linked agent over it, replay the recent conversation, forward through
//! the router, then persist the new turn pair and usage counters.

use crate::api::handlers::AppState;
use crate::api::models::{
    ChatRequest, DeploymentChatRequest, DeploymentChatResponse, Provider,
};
use crate::api::validation::{validate_chat_request, MAX_PROMPT_CHARS};
use crate::core::error::{AppError, Result, ValidationIssue};
use crate::core::logging::{generate_request_id, get_request_id, REQUEST_ID};
use crate::core::rate_limiter::{decision_headers, derive_client_id, Endpoint};
use crate::services::deployments::merge_config;
use crate::services::gateway::HISTORY_TURNS;
use crate::services::knowledge::MAX_SUGGESTED_TOPICS;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// Handle deployment-scoped chat requests.
///
/// Shares the rate-limit bucket with the universal processor.
#[tracing::instrument(skip(state, headers, request), fields(deployment_id = %request.deployment_id))]
pub async fn deployment_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DeploymentChatRequest>,
) -> Response {
    let request_id = generate_request_id();

    REQUEST_ID
        .scope(request_id, async move {
            let client_id = derive_client_id(&headers);
            let decision = state.rate_limiter.check(&client_id, Endpoint::AiChat).await;
            let limit_headers = decision_headers(&decision);

            let result: Result<Response> = if decision.allowed {
                process_deployment_chat(&state, request).await
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

async fn process_deployment_chat(
    state: &AppState,
    request: DeploymentChatRequest,
) -> Result<Response> {
    validate_message(&request)?;

    let deployment = state
        .deployments
        .load_deployment(&request.deployment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Deployment not found".to_string()))?;

    if !deployment.is_enabled {
        return Err(AppError::Forbidden("Deployment is disabled".to_string()));
    }

    let agent = match &deployment.agent_id {
        Some(agent_id) => state.deployments.load_agent(agent_id).await?,
        None => None,
    };
    let effective = merge_config(&deployment, agent.as_ref());

    let conversation_id = state
        .deployments
        .ensure_conversation(
            &deployment.id,
            request.conversation_id.as_deref(),
            request.session_id.as_deref(),
        )
        .await?;

    let history = state
        .deployments
        .load_history(&conversation_id, HISTORY_TURNS as i64)
        .await?;

    let system_prompt = compose_system_prompt(
        effective.system_prompt.as_deref(),
        request.current_context.as_deref(),
    );

    let chat_request = ChatRequest {
        provider: provider_hint(&effective.model),
        model: effective.model,
        prompt: request.message.clone(),
        system_prompt,
        temperature: effective.temperature,
        max_tokens: None,
        images: None,
        image_url: None,
        use_rag: effective.use_knowledge_base,
        use_mcp: !effective.mcp_server_names.is_empty(),
        mcp_servers: if effective.mcp_server_names.is_empty() {
            None
        } else {
            Some(effective.mcp_server_names)
        },
        conversation_history: if history.is_empty() {
            None
        } else {
            Some(history)
        },
        extra: Default::default(),
    };
    validate_chat_request(&chat_request).map_err(AppError::Validation)?;

    let outcome = state.router.process(Endpoint::AiChat, chat_request).await?;

    // The response is computed; persistence below is best-effort.
    if let Err(e) = state
        .deployments
        .append_turns(&conversation_id, &request.message, &outcome.content)
        .await
    {
        tracing::warn!(
            request_id = %get_request_id(),
            error = %e,
            "Failed to append conversation turns"
        );
    }
    if let Err(e) = state.deployments.increment_usage(&deployment.id).await {
        tracing::warn!(
            request_id = %get_request_id(),
            error = %e,
            "Failed to increment deployment usage"
        );
    }

    let suggested_topics = if deployment.use_knowledge_base {
        state
            .knowledge
            .entry_names(MAX_SUGGESTED_TOPICS)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load suggested topics");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    Ok(Json(DeploymentChatResponse {
        content: outcome.content,
        provider: outcome.provider,
        model: outcome.model,
        conversation_id,
        rag_used: outcome.rag_used,
        mcp_used: outcome.mcp_used,
        suggested_topics,
    })
    .into_response())
}

fn validate_message(request: &DeploymentChatRequest) -> Result<()> {
    let mut issues = Vec::new();

    let chars = request.message.chars().count();
    if chars == 0 {
        issues.push(ValidationIssue::new("message", "must not be empty"));
    } else if chars > MAX_PROMPT_CHARS {
        issues.push(ValidationIssue::new(
            "message",
            format!("must be at most {} characters", MAX_PROMPT_CHARS),
        ));
    }

    if request.deployment_id.trim().is_empty() {
        issues.push(ValidationIssue::new("deploymentId", "must not be empty"));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(issues))
    }
}

/// Informational provider label for a composed request; dispatch always
/// goes through the unified gateway regardless.
fn provider_hint(model: &str) -> Provider {
    let lowered = model.to_ascii_lowercase();
    if lowered.contains("claude") {
        Provider::Claude
    } else if lowered.contains("gpt") || lowered.starts_with("openai/") {
        Provider::OpenAI
    } else {
        Provider::Gemini
    }
}

fn compose_system_prompt(base: Option<&str>, current_context: Option<&str>) -> Option<String> {
    match (base, current_context) {
        (Some(base), Some(context)) => {
            Some(format!("{}\n\nCurrent page context:\n{}", base, context))
        }
        (Some(base), None) => Some(base.to_string()),
        (None, Some(context)) => Some(format!("Current page context:\n{}", context)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_hint() {
        assert_eq!(provider_hint("claude-3-5-sonnet"), Provider::Claude);
        assert_eq!(provider_hint("openai/gpt-5"), Provider::OpenAI);
        assert_eq!(provider_hint("google/gemini-2.5-flash"), Provider::Gemini);
    }

    #[test]
    fn test_compose_system_prompt() {
        assert_eq!(compose_system_prompt(None, None), None);
        assert_eq!(
            compose_system_prompt(Some("base"), None).as_deref(),
            Some("base")
        );
        let combined = compose_system_prompt(Some("base"), Some("on pricing page")).unwrap();
        assert!(combined.starts_with("base"));
        assert!(combined.contains("on pricing page"));
    }

    #[test]
    fn test_validate_message_bounds() {
        let mut request = DeploymentChatRequest {
            deployment_id: "dep-1".to_string(),
            message: "hello".to_string(),
            conversation_id: None,
            session_id: None,
            current_context: None,
            extra: Default::default(),
        };
        assert!(validate_message(&request).is_ok());

        request.message = String::new();
        assert!(validate_message(&request).is_err());

        request.message = "a".repeat(MAX_PROMPT_CHARS + 1);
        assert!(validate_message(&request).is_err());
    }
}
