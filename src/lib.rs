//! Genie Gateway - request admission and routing for AI chat features
//!
//! This library fronts paid upstream AI providers behind one service with:
//!
//! - **Fixed-Window Rate Limiting**: per-client, per-endpoint counters in a
//!   shared database table, failing open on infrastructure errors
//! - **Request Validation**: strict field bounds with machine-readable issues
//! - **Model Normalization**: legacy vendor model names mapped to canonical
//!   `vendor/model` identifiers for a single unified upstream gateway
//! - **Prompt Augmentation**: knowledge-base retrieval and MCP tool-context
//!   fan-out, both best-effort
//! - **Analytics**: batched exchange logging, knowledge-gap suggestions, and
//!   annotation forwarding, all fire-and-forget
//!
//! # Architecture
//!
//! The codebase is organized into three main layers:
//!
//! - [`core`]: Core functionality (config, database, errors, rate limiting, metrics)
//! - [`api`]: HTTP handlers and request/response models
//! - [`services`]: Business logic (model catalog, gateway client, augmentation, orchestration)
//!
//! # Configuration
//!
//! The server requires the following environment variables:
//! - `DB_URL`: PostgreSQL database connection URL
//!
//! Optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8787)
//! - `GATEWAY_API_BASE`: Unified AI gateway base URL
//! - `GATEWAY_API_KEY`: Unified AI gateway credential (requests fail with
//!   "not configured" when absent)
//! - `LABEL_STUDIO_URL` / `LABEL_STUDIO_API_KEY`: annotation forwarding

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{ai_chat, deployment_chat, AppState, ChatRequest, ChatResponse};
pub use core::{
    AppConfig, AppError, Database, DatabaseConfig, Endpoint, RateLimiter, Result,
};
pub use services::ChatRouter;
