//! Model-Context-Protocol tool-context fan-out.
//!
//! Context providers are independent HTTP services; whichever respond
//! successfully within the timeout contribute a JSON payload. Individual
//! failures are dropped silently and a total failure yields no block.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::time::Duration;

/// A configured external context provider.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct McpServerConfig {
    pub name: String,
    pub endpoint_url: String,
}

/// Directory of configured MCP servers.
#[async_trait]
pub trait McpDirectory: Send + Sync {
    /// Enabled servers, filtered to `names` when given.
    async fn resolve(&self, names: Option<&[String]>)
        -> Result<Vec<McpServerConfig>, sqlx::Error>;
}

/// Postgres-backed directory over `mcp_servers`.
pub struct PgMcpDirectory {
    pool: PgPool,
}

impl PgMcpDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl McpDirectory for PgMcpDirectory {
    async fn resolve(
        &self,
        names: Option<&[String]>,
    ) -> Result<Vec<McpServerConfig>, sqlx::Error> {
        match names {
            Some(names) if !names.is_empty() => {
                sqlx::query_as::<_, McpServerConfig>(
                    r#"
                    SELECT name, endpoint_url FROM mcp_servers
                    WHERE is_enabled = true AND name = ANY($1)
                    ORDER BY name
                    "#,
                )
                .bind(names)
                .fetch_all(&self.pool)
                .await
            }
            _ => {
                sqlx::query_as::<_, McpServerConfig>(
                    r#"
                    SELECT name, endpoint_url FROM mcp_servers
                    WHERE is_enabled = true
                    ORDER BY name
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
    }
}

/// Context returned by one provider.
#[derive(Debug, Clone)]
pub struct McpContext {
    pub server: String,
    pub payload: Value,
}

/// Fan-out HTTP client for context providers.
#[derive(Clone)]
pub struct McpClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl McpClient {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Query every server concurrently and keep the successes.
    pub async fn gather(&self, servers: &[McpServerConfig], prompt: &str) -> Vec<McpContext> {
        let calls = servers.iter().map(|server| self.query_one(server, prompt));
        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn query_one(&self, server: &McpServerConfig, prompt: &str) -> Option<McpContext> {
        let result = self
            .http
            .post(&server.endpoint_url)
            .timeout(self.timeout)
            .json(&json!({ "query": prompt }))
            .send()
            .await;

        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!(
                    server = %server.name,
                    status = response.status().as_u16(),
                    "MCP server returned non-success, dropping"
                );
                return None;
            }
            Err(e) => {
                tracing::debug!(server = %server.name, error = %e, "MCP server call failed, dropping");
                return None;
            }
        };

        match response.json::<Value>().await {
            Ok(payload) => Some(McpContext {
                server: server.name.clone(),
                payload,
            }),
            Err(e) => {
                tracing::debug!(server = %server.name, error = %e, "MCP server returned invalid JSON, dropping");
                None
            }
        }
    }
}

/// Concatenate collected payloads into one context block.
pub fn build_tool_block(contexts: &[McpContext]) -> Option<String> {
    if contexts.is_empty() {
        return None;
    }

    let block = contexts
        .iter()
        .map(|context| format!("[{}] {}", context.server, context.payload))
        .collect::<Vec<_>>()
        .join("\n");

    Some(block)
}
