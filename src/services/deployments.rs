//! Deployment configuration, agent merging, and conversation persistence.

use crate::api::models::ChatMessage;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// A deployed chat configuration owned by the surrounding application.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub agent_id: Option<String>,
    pub mcp_server_names: Vec<String>,
    pub use_knowledge_base: bool,
    pub is_enabled: bool,
    pub message_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// A reusable agent configuration optionally linked from a deployment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Agent {
    pub id: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

/// The configuration actually used for a deployment-scoped request.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub mcp_server_names: Vec<String>,
    pub use_knowledge_base: bool,
}

/// Merge a linked agent's settings over the deployment's defaults.
/// Agent settings take precedence wherever present.
pub fn merge_config(deployment: &Deployment, agent: Option<&Agent>) -> EffectiveConfig {
    let (system_prompt, model, temperature) = match agent {
        Some(agent) => (
            agent
                .system_prompt
                .clone()
                .or_else(|| deployment.system_prompt.clone()),
            agent.model.clone().unwrap_or_else(|| deployment.model.clone()),
            agent.temperature,
        ),
        None => (deployment.system_prompt.clone(), deployment.model.clone(), None),
    };

    EffectiveConfig {
        system_prompt,
        model,
        temperature,
        mcp_server_names: deployment.mcp_server_names.clone(),
        use_knowledge_base: deployment.use_knowledge_base,
    }
}

/// Store for deployments, agents, and conversations.
#[derive(Clone)]
pub struct DeploymentService {
    pool: PgPool,
}

impl DeploymentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_deployment(&self, id: &str) -> Result<Option<Deployment>, sqlx::Error> {
        sqlx::query_as::<_, Deployment>(
            r#"
            SELECT id, name, system_prompt, model, agent_id, mcp_server_names,
                   use_knowledge_base, is_enabled, message_count, updated_at
            FROM deployments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn load_agent(&self, id: &str) -> Result<Option<Agent>, sqlx::Error> {
        sqlx::query_as::<_, Agent>(
            r#"
            SELECT id, system_prompt, model, temperature
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Return the existing conversation id, or create a fresh conversation.
    pub async fn ensure_conversation(
        &self,
        deployment_id: &str,
        conversation_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<String, sqlx::Error> {
        if let Some(id) = conversation_id {
            return Ok(id.to_string());
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO conversations (id, deployment_id, session_id, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(&id)
        .bind(deployment_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Load the last `turns` messages in chronological order.
    pub async fn load_history(
        &self,
        conversation_id: &str,
        turns: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let mut rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT role, content FROM conversation_messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(turns)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows
            .into_iter()
            .map(|(role, content)| ChatMessage { role, content })
            .collect())
    }

    /// Append the user/assistant turn pair after a successful exchange.
    pub async fn append_turns(
        &self,
        conversation_id: &str,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO conversation_messages (conversation_id, role, content, created_at)
            VALUES ($1, 'user', $2, NOW()), ($1, 'assistant', $3, NOW())
            "#,
        )
        .bind(conversation_id)
        .bind(user_message)
        .bind(assistant_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_usage(&self, deployment_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE deployments
            SET message_count = message_count + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(deployment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
