//! Client for the unified upstream AI gateway.
//!
//! Every request, whatever vendor the caller named, goes through this one
//! OpenAI-compatible chat-completion endpoint with a normalized
//! `vendor/model` identifier.

use crate::core::config::GatewayConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::get_request_id;
use crate::core::metrics::get_metrics;
use crate::services::model_catalog::capabilities_for;
use serde_json::{json, Value};
use std::time::Instant;

use crate::api::models::ChatMessage;

/// Turn suffix kept when composing history into the outbound message list.
pub const HISTORY_TURNS: usize = 10;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self { http, config }
    }

    /// Dispatch a chat completion and return the generated text.
    ///
    /// Upstream failures surface with the upstream's own message; no retry
    /// is performed here.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<Value>,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AppError::NotConfigured("GATEWAY_API_KEY"))?;

        let capabilities = capabilities_for(model);
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temperature) = temperature {
            if capabilities.supports_temperature {
                body["temperature"] = json!(temperature);
            }
        }
        if let Some(max_tokens) = max_tokens {
            body[capabilities.token_param] = json!(max_tokens);
        }

        let url = format!("{}/chat/completions", self.config.api_base);
        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    request_id = %get_request_id(),
                    model = %model,
                    error = %e,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    "HTTP request failed to gateway"
                );
                AppError::from(e)
            })?;

        get_metrics()
            .upstream_latency
            .with_label_values(&[model])
            .observe(started.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_upstream_error(&text)
                .unwrap_or_else(|| format!("gateway returned status {}", status.as_u16()));
            tracing::error!(
                request_id = %get_request_id(),
                model = %model,
                status = status.as_u16(),
                "Gateway request failed"
            );
            return Err(AppError::Upstream(message));
        }

        let data: Value = response.json().await?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AppError::Upstream("gateway response missing content".to_string()))?
            .to_string();

        Ok(content)
    }
}

/// Pull the upstream's own error message out of an error body, if any.
fn extract_upstream_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if let Some(message) = value["error"]["message"].as_str() {
        return Some(message.to_string());
    }
    if let Some(message) = value["error"].as_str() {
        return Some(message.to_string());
    }
    None
}

/// Assemble the outbound message list.
///
/// Order: one system message (base system prompt + knowledge block + tool
/// block), the trailing conversation history, then the user prompt with
/// any images attached as content parts.
pub fn build_messages(
    system_prompt: Option<&str>,
    knowledge_block: Option<&str>,
    tool_block: Option<&str>,
    history: Option<&[ChatMessage]>,
    prompt: &str,
    images: &[String],
) -> Vec<Value> {
    let mut messages = Vec::new();

    let mut system_parts = Vec::new();
    if let Some(system_prompt) = system_prompt {
        if !system_prompt.is_empty() {
            system_parts.push(system_prompt.to_string());
        }
    }
    if let Some(block) = knowledge_block {
        system_parts.push(format!("Relevant knowledge base entries:\n{}", block));
    }
    if let Some(block) = tool_block {
        system_parts.push(format!("Context from connected tools:\n{}", block));
    }
    if !system_parts.is_empty() {
        messages.push(json!({
            "role": "system",
            "content": system_parts.join("\n\n"),
        }));
    }

    if let Some(history) = history {
        let start = history.len().saturating_sub(HISTORY_TURNS);
        for turn in &history[start..] {
            messages.push(json!({
                "role": turn.role,
                "content": turn.content,
            }));
        }
    }

    if images.is_empty() {
        messages.push(json!({
            "role": "user",
            "content": prompt,
        }));
    } else {
        let mut parts = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": image },
            }));
        }
        messages.push(json!({
            "role": "user",
            "content": parts,
        }));
    }

    messages
}
