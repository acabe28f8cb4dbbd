//! Core functionality for the gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Database access
//! - Rate limiting
//! - Metrics collection

pub mod config;
pub mod database;
pub mod error;
pub mod exchange_logger;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;

// Re-export commonly used types
pub use config::{AppConfig, GatewayConfig, ServerConfig};
pub use database::{Database, DatabaseConfig};
pub use error::{AppError, Result, ValidationIssue};
pub use exchange_logger::{ExchangeLogger, ExchangeRecord};
pub use logging::{generate_request_id, get_request_id, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use rate_limiter::{
    derive_client_id, Endpoint, PgRateLimitStore, RateLimitDecision, RateLimiter,
};
