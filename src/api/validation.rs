//! Request validation.
//!
//! Validation runs after JSON parsing and before any business logic; a
//! request that fails any constraint never reaches the dispatch stage.
//! Failures are reported as `{path, message}` pairs so callers can
//! correct and retry.

use crate::api::models::{ChatMessage, ChatRequest};
use crate::core::error::ValidationIssue;

pub const MAX_PROMPT_CHARS: usize = 10_000;
pub const MAX_SYSTEM_PROMPT_CHARS: usize = 5_000;
pub const MIN_MAX_TOKENS: u32 = 1;
pub const MAX_MAX_TOKENS: u32 = 32_000;
pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

const VALID_ROLES: &[&str] = &["system", "user", "assistant"];

/// Parse a raw JSON body into a [`ChatRequest`] and validate all bounds.
pub fn parse_chat_request(body: serde_json::Value) -> Result<ChatRequest, Vec<ValidationIssue>> {
    let request: ChatRequest = serde_json::from_value(body)
        .map_err(|e| vec![ValidationIssue::new("", e.to_string())])?;
    validate_chat_request(&request)?;
    Ok(request)
}

/// Check every string-length and numeric-range constraint on a parsed request.
pub fn validate_chat_request(request: &ChatRequest) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let prompt_chars = request.prompt.chars().count();
    if prompt_chars == 0 {
        issues.push(ValidationIssue::new("prompt", "must not be empty"));
    } else if prompt_chars > MAX_PROMPT_CHARS {
        issues.push(ValidationIssue::new(
            "prompt",
            format!("must be at most {} characters", MAX_PROMPT_CHARS),
        ));
    }

    if let Some(system_prompt) = &request.system_prompt {
        if system_prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
            issues.push(ValidationIssue::new(
                "systemPrompt",
                format!("must be at most {} characters", MAX_SYSTEM_PROMPT_CHARS),
            ));
        }
    }

    if let Some(temperature) = request.temperature {
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
            issues.push(ValidationIssue::new(
                "temperature",
                format!("must be between {} and {}", MIN_TEMPERATURE, MAX_TEMPERATURE),
            ));
        }
    }

    if let Some(max_tokens) = request.max_tokens {
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
            issues.push(ValidationIssue::new(
                "maxTokens",
                format!("must be between {} and {}", MIN_MAX_TOKENS, MAX_MAX_TOKENS),
            ));
        }
    }

    if request.model.trim().is_empty() {
        issues.push(ValidationIssue::new("model", "must not be empty"));
    }

    if let Some(history) = &request.conversation_history {
        validate_history(history, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn validate_history(history: &[ChatMessage], issues: &mut Vec<ValidationIssue>) {
    for (index, message) in history.iter().enumerate() {
        if !VALID_ROLES.contains(&message.role.as_str()) {
            issues.push(ValidationIssue::new(
                format!("conversationHistory.{}.role", index),
                "must be one of: system, user, assistant",
            ));
        }
        if message.content.is_empty() {
            issues.push(ValidationIssue::new(
                format!("conversationHistory.{}.content", index),
                "must not be empty",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Provider;
    use serde_json::json;

    fn base_request() -> ChatRequest {
        ChatRequest {
            provider: Provider::Claude,
            model: "claude-3-5-sonnet".to_string(),
            prompt: "hello".to_string(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            images: None,
            image_url: None,
            use_rag: true,
            use_mcp: false,
            mcp_servers: None,
            conversation_history: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_chat_request(&base_request()).is_ok());
    }

    #[test]
    fn test_prompt_boundary_at_limit_accepted() {
        let mut request = base_request();
        request.prompt = "a".repeat(MAX_PROMPT_CHARS);
        assert!(validate_chat_request(&request).is_ok());
    }

    #[test]
    fn test_prompt_over_limit_rejected_with_path() {
        let mut request = base_request();
        request.prompt = "a".repeat(MAX_PROMPT_CHARS + 1);
        let issues = validate_chat_request(&request).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "prompt"));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let mut request = base_request();
        request.prompt = String::new();
        assert!(validate_chat_request(&request).is_err());
    }

    #[test]
    fn test_temperature_boundary() {
        let mut request = base_request();
        request.temperature = Some(2.0);
        assert!(validate_chat_request(&request).is_ok());

        request.temperature = Some(2.01);
        let issues = validate_chat_request(&request).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "temperature"));

        request.temperature = Some(-0.1);
        assert!(validate_chat_request(&request).is_err());
    }

    #[test]
    fn test_max_tokens_boundary() {
        let mut request = base_request();
        request.max_tokens = Some(32_000);
        assert!(validate_chat_request(&request).is_ok());

        request.max_tokens = Some(32_001);
        let issues = validate_chat_request(&request).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "maxTokens"));

        request.max_tokens = Some(0);
        assert!(validate_chat_request(&request).is_err());
    }

    #[test]
    fn test_system_prompt_boundary() {
        let mut request = base_request();
        request.system_prompt = Some("a".repeat(MAX_SYSTEM_PROMPT_CHARS));
        assert!(validate_chat_request(&request).is_ok());

        request.system_prompt = Some("a".repeat(MAX_SYSTEM_PROMPT_CHARS + 1));
        let issues = validate_chat_request(&request).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "systemPrompt"));
    }

    #[test]
    fn test_invalid_history_role_rejected_with_index_path() {
        let mut request = base_request();
        request.conversation_history = Some(vec![
            ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            },
            ChatMessage {
                role: "wizard".to_string(),
                content: "greetings".to_string(),
            },
        ]);
        let issues = validate_chat_request(&request).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "conversationHistory.1.role"));
    }

    #[test]
    fn test_multiple_issues_collected() {
        let mut request = base_request();
        request.prompt = String::new();
        request.temperature = Some(5.0);
        request.max_tokens = Some(0);
        let issues = validate_chat_request(&request).unwrap_err();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_parse_chat_request_reports_parse_errors() {
        let issues = parse_chat_request(json!({
            "provider": "claude",
            "model": "claude-3-5-sonnet",
        }))
        .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("prompt"));
    }
}
