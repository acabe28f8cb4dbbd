//! API layer for the gateway.
//!
//! This module contains all HTTP handlers, request/response models,
//! and request validation for the API endpoints.

pub mod deployment;
pub mod handlers;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use deployment::deployment_chat;
pub use handlers::{ai_chat, health, metrics_handler, AppState};
pub use models::{
    ChatMessage, ChatRequest, ChatResponse, DeploymentChatRequest, DeploymentChatResponse,
    Provider,
};
pub use validation::{parse_chat_request, validate_chat_request};
