//! Configuration management for the gateway.
//!
//! All configuration is environment-driven and loaded once at startup;
//! the resulting [`AppConfig`] is immutable for the lifetime of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Unified AI gateway configuration
    pub gateway: GatewayConfig,

    /// Optional annotation/labeling service (Label Studio compatible)
    pub annotation: Option<AnnotationConfig>,

    /// Request timeout in seconds for upstream calls
    pub request_timeout_secs: u64,

    /// Per-call timeout in seconds for MCP context servers
    pub mcp_timeout_secs: u64,

    /// Interval in seconds between stale rate-limit row sweeps
    pub rate_limit_sweep_secs: u64,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
        }
    }
}

/// Connection settings for the single unified upstream AI gateway.
///
/// All nominally distinct providers are normalized to `vendor/model`
/// identifiers and dispatched through this one endpoint. The API key is
/// optional at startup; requests fail with a "not configured" error when
/// it is absent, rather than silently falling back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_base: String,
    pub api_key: Option<String>,
}

/// Annotation forwarding target. Present only when both URL and key are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    pub url: String,
    pub api_key: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// `.env` is loaded by the caller (main) before this runs.
    pub fn from_env() -> Result<Self> {
        let mut server = ServerConfig::default();
        if let Ok(host) = std::env::var("HOST") {
            server.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            server.port = port_str
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", port_str))?;
        }

        let gateway = GatewayConfig {
            api_base: std::env::var("GATEWAY_API_BASE")
                .unwrap_or_else(|_| "https://ai.gateway.lovable.dev/v1".to_string()),
            api_key: std::env::var("GATEWAY_API_KEY").ok().filter(|k| !k.is_empty()),
        };

        let annotation = match (
            std::env::var("LABEL_STUDIO_URL").ok().filter(|v| !v.is_empty()),
            std::env::var("LABEL_STUDIO_API_KEY").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(url), Some(api_key)) => Some(AnnotationConfig { url, api_key }),
            _ => None,
        };

        Ok(Self {
            server,
            gateway,
            annotation,
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 120),
            mcp_timeout_secs: env_u64("MCP_TIMEOUT_SECS", 10),
            rate_limit_sweep_secs: env_u64("RATE_LIMIT_SWEEP_SECS", 3600),
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}
