//! API request and response models.
//!
//! Wire field names are camelCase to match the surrounding product's
//! clients. Unknown JSON keys are accepted and carried in `extra` rather
//! than rejected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Nominal upstream vendor requested by the caller.
///
/// Informational only: after model normalization every request is
/// dispatched through the single unified gateway, not the named vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

/// Chat request accepted by the universal processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub provider: Provider,

    /// Caller-supplied model identifier, subject to normalization
    pub model: String,

    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature in [0, 2]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate, in [1, 32000]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Base64 or data-URL images for multimodal requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Knowledge-base augmentation, on by default
    #[serde(rename = "useRAG", default = "default_true")]
    pub use_rag: bool,

    /// External tool-context augmentation
    #[serde(rename = "useMCP", default)]
    pub use_mcp: bool,

    /// Names of MCP servers to fan out to; empty means all enabled servers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<String>>,

    /// Prior turns for continuity; truncated server-side to the last 10
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ChatMessage>>,

    /// Unrecognized fields, accepted and ignored
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Successful response from the universal processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub content: String,

    /// Normalized `vendor/model` identifier actually dispatched
    pub provider: String,
    pub model: String,

    pub rag_used: bool,
    pub mcp_used: bool,
    pub has_vision: bool,
    pub label_studio_logged: bool,
}

/// Request body for the deployment-scoped chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentChatRequest {
    pub deployment_id: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Successful response from the deployment-scoped chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentChatResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub conversation_id: String,
    pub rag_used: bool,
    pub mcp_used: bool,

    /// Up to 5 follow-up topics drawn from knowledge-base entry names
    pub suggested_topics: Vec<String>,
}
