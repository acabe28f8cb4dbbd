//! Business logic services for the gateway.
//!
//! This module contains the model catalog, the unified gateway client,
//! augmentation sources, request orchestration, and deployment storage.

pub mod deployments;
pub mod gateway;
pub mod knowledge;
pub mod mcp;
pub mod model_catalog;
pub mod postprocess;
pub mod router;

// Re-export commonly used types
pub use deployments::{merge_config, Agent, Deployment, DeploymentService, EffectiveConfig};
pub use gateway::{build_messages, GatewayClient, HISTORY_TURNS};
pub use knowledge::{
    sanitize_search_phrase, KnowledgeEntry, KnowledgeSource, PgKnowledgeSource,
};
pub use mcp::{McpClient, McpDirectory, McpServerConfig, PgMcpDirectory};
pub use model_catalog::{capabilities_for, normalize_model, vendor_of, DEFAULT_MODEL};
pub use postprocess::PostProcessor;
pub use router::ChatRouter;
