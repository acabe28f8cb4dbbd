//! Genie Gateway - Main entry point
//!
//! This binary creates and runs the HTTP server with all configured routes
//! and middleware. Cross-request state lives in PostgreSQL; each request is
//! handled by an independent, stateless task.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use genie_gateway::{
    api::{ai_chat, deployment_chat, health, metrics_handler, AppState},
    core::{
        database::{Database, DatabaseConfig},
        init_metrics,
        middleware::track_metrics,
        rate_limiter::{sweep_stale, PgRateLimitStore, RateLimiter},
        AppConfig, ExchangeLogger,
    },
    services::{
        ChatRouter, DeploymentService, GatewayClient, McpClient, PgKnowledgeSource,
        PgMcpDirectory, PostProcessor,
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Retention for stale rate-limit rows swept by the background task.
const RATE_LIMIT_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_logging();
    init_metrics();

    let config = AppConfig::from_env()?;

    let db_url = std::env::var("DB_URL")
        .map_err(|_| anyhow::anyhow!("DB_URL environment variable is required"))?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&DatabaseConfig::from_url(&db_url)).await?;
    tracing::info!("Database connected successfully");

    if !db.check_migrations().await? {
        return Err(anyhow::anyhow!(
            "Database migrations not applied. Apply the SQL in migrations/ first."
        ));
    }

    let pool = db.pool().clone();

    // Periodic sweep of expired rate-limit rows; the request path never
    // depends on it.
    let sweep_pool = pool.clone();
    let sweep_secs = config.rate_limit_sweep_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_secs.max(60)));
        loop {
            interval.tick().await;
            match sweep_stale(&sweep_pool, RATE_LIMIT_RETENTION_MS).await {
                Ok(0) => {}
                Ok(deleted) => tracing::info!(deleted, "Swept stale rate limit rows"),
                Err(e) => tracing::warn!(error = %e, "Rate limit sweep failed"),
            }
        }
    });

    let http_client = create_http_client(&config);
    let gateway = GatewayClient::new(http_client.clone(), config.gateway.clone());
    let exchange_logger = Arc::new(ExchangeLogger::new(pool.clone()));

    let postprocess = PostProcessor::new(
        exchange_logger,
        pool.clone(),
        gateway.clone(),
        config.annotation.clone(),
        http_client.clone(),
    );

    let router = ChatRouter::new(
        gateway,
        Arc::new(PgKnowledgeSource::new(pool.clone())),
        Arc::new(PgMcpDirectory::new(pool.clone())),
        McpClient::new(
            http_client,
            std::time::Duration::from_secs(config.mcp_timeout_secs),
        ),
        postprocess,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        rate_limiter: RateLimiter::new(Arc::new(PgRateLimitStore::new(pool.clone()))),
        router,
        deployments: DeploymentService::new(pool.clone()),
        knowledge: Arc::new(PgKnowledgeSource::new(pool)),
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting Genie Gateway on {}", addr);
    tracing::info!("Chat API: /v1/chat, /v1/deployments/chat");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    // Always suppress noisy HTTP library logs regardless of RUST_LOG setting
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,genie_gateway=debug".to_string());
    let filter_str = format!("{},hyper=warn,h2=warn,reqwest=warn", base_filter);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter_str))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build router with all endpoints
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat", post(ai_chat))
        .route("/v1/deployments/chat", post(deployment_chat))
        .with_state(state)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create HTTP client with connection pooling
fn create_http_client(config: &AppConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
}
