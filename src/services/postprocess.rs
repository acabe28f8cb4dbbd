//! Fire-and-forget post-processing of completed exchanges.
//!
//! Three side effects run after a response has been computed: the
//! analytics record, a knowledge-gap analysis, and annotation forwarding.
//! They run concurrently in a detached task; their failures are logged
//! and never surface to the caller or delay the response.

use crate::core::config::AnnotationConfig;
use crate::core::exchange_logger::{ExchangeLogger, ExchangeRecord};
use crate::services::gateway::GatewayClient;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Model used for the secondary gap-analysis call. Cheapest tier.
const GAP_ANALYSIS_MODEL: &str = "google/gemini-2.5-flash-lite";

const GAP_ANALYSIS_SYSTEM_PROMPT: &str = "You review chat exchanges for a product \
knowledge base. If the user's question names a concrete topic the knowledge base \
should document but did not cover, reply with exactly: MISSING: <topic>. \
Otherwise reply with exactly: OK.";

#[derive(Clone)]
pub struct PostProcessor {
    exchange_logger: Arc<ExchangeLogger>,
    pool: PgPool,
    gateway: GatewayClient,
    annotation: Option<AnnotationConfig>,
    http: reqwest::Client,
}

impl PostProcessor {
    pub fn new(
        exchange_logger: Arc<ExchangeLogger>,
        pool: PgPool,
        gateway: GatewayClient,
        annotation: Option<AnnotationConfig>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            exchange_logger,
            pool,
            gateway,
            annotation,
            http,
        }
    }

    pub fn annotation_configured(&self) -> bool {
        self.annotation.is_some()
    }

    /// Start all three side effects in a detached task and return
    /// immediately. The response being served never waits on them.
    pub fn dispatch(&self, record: ExchangeRecord) {
        let this = self.clone();
        tokio::spawn(async move {
            let log_task = async {
                this.exchange_logger.log(record.clone());
            };
            let gap_task = this.analyze_knowledge_gap(&record);
            let annotation_task = this.forward_annotation(&record);
            tokio::join!(log_task, gap_task, annotation_task);
        });
    }

    /// Ask a cheap model whether this exchange reveals a missing
    /// knowledge-base entry, and queue a suggestion row for human review.
    async fn analyze_knowledge_gap(&self, record: &ExchangeRecord) {
        // Only exchanges the knowledge base failed to cover are candidates.
        if record.rag_used {
            return;
        }

        let excerpt: String = record.prompt.chars().take(500).collect();
        let messages = vec![
            json!({ "role": "system", "content": GAP_ANALYSIS_SYSTEM_PROMPT }),
            json!({ "role": "user", "content": format!("User asked: {}", excerpt) }),
        ];

        let verdict = match self
            .gateway
            .chat_completion(GAP_ANALYSIS_MODEL, messages, None, Some(100))
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::debug!(error = %e, "Knowledge gap analysis call failed");
                return;
            }
        };

        let Some(topic) = verdict.trim().strip_prefix("MISSING:") else {
            return;
        };
        let topic = topic.trim();
        if topic.is_empty() {
            return;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO kb_suggestions (topic, rationale, source_prompt, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            "#,
        )
        .bind(topic)
        .bind("Exchange not covered by existing knowledge base entries")
        .bind(&record.prompt)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => tracing::info!(topic = %topic, "Queued knowledge base suggestion"),
            Err(e) => tracing::warn!(error = %e, "Failed to queue knowledge base suggestion"),
        }
    }

    /// Forward the exchange to the annotation service, when configured.
    async fn forward_annotation(&self, record: &ExchangeRecord) {
        let Some(annotation) = &self.annotation else {
            return;
        };

        let task = json!([{
            "data": {
                "prompt": record.prompt,
                "response": record.response,
                "model": record.model,
                "endpoint": record.endpoint,
                "request_id": record.request_id,
            }
        }]);

        let result = self
            .http
            .post(&annotation.url)
            .header("Authorization", format!("Token {}", annotation.api_key))
            .json(&task)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(
                status = response.status().as_u16(),
                "Annotation service rejected exchange"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to forward exchange to annotation service"),
        }
    }
}
