//! Request orchestration: normalization, augmentation, dispatch, and
//! post-processing hand-off.

use crate::api::models::{ChatRequest, ChatResponse};
use crate::core::error::Result;
use crate::core::exchange_logger::ExchangeRecord;
use crate::core::logging::get_request_id;
use crate::core::rate_limiter::Endpoint;
use crate::services::gateway::{build_messages, GatewayClient};
use crate::services::knowledge::{
    build_knowledge_block, sanitize_search_phrase, KnowledgeSource, MAX_CONTEXT_ENTRIES,
};
use crate::services::mcp::{build_tool_block, McpClient, McpDirectory};
use crate::services::model_catalog::{normalize_model, vendor_of};
use crate::services::postprocess::PostProcessor;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct ChatRouter {
    gateway: GatewayClient,
    knowledge: Arc<dyn KnowledgeSource>,
    mcp_directory: Arc<dyn McpDirectory>,
    mcp_client: McpClient,
    postprocess: PostProcessor,
}

impl ChatRouter {
    pub fn new(
        gateway: GatewayClient,
        knowledge: Arc<dyn KnowledgeSource>,
        mcp_directory: Arc<dyn McpDirectory>,
        mcp_client: McpClient,
        postprocess: PostProcessor,
    ) -> Self {
        Self {
            gateway,
            knowledge,
            mcp_directory,
            mcp_client,
            postprocess,
        }
    }

    /// Run a validated request through normalization, augmentation, and
    /// dispatch. Augmentation failures degrade; dispatch failures propagate.
    pub async fn process(&self, endpoint: Endpoint, request: ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let model = normalize_model(&request.model);

        tracing::debug!(
            request_id = %get_request_id(),
            requested_model = %request.model,
            model = %model,
            "Processing chat request"
        );

        // Knowledge retrieval and tool fan-out run concurrently.
        let (knowledge_block, tool_block) =
            tokio::join!(self.fetch_knowledge(&request), self.fetch_tool_context(&request));

        let rag_used = knowledge_block.is_some();
        let mcp_used = tool_block.is_some();

        let images = collect_images(&request);
        let has_vision = !images.is_empty();

        let messages = build_messages(
            request.system_prompt.as_deref(),
            knowledge_block.as_deref(),
            tool_block.as_deref(),
            request.conversation_history.as_deref(),
            &request.prompt,
            &images,
        );

        let content = self
            .gateway
            .chat_completion(&model, messages, request.temperature, request.max_tokens)
            .await?;

        let response = ChatResponse {
            content,
            provider: vendor_of(&model).to_string(),
            model: model.clone(),
            rag_used,
            mcp_used,
            has_vision,
            label_studio_logged: self.postprocess.annotation_configured(),
        };

        // The response is fully computed; everything below is
        // fire-and-forget and cannot change or delay it.
        self.postprocess.dispatch(ExchangeRecord {
            request_id: get_request_id(),
            endpoint: endpoint.as_str().to_string(),
            provider: response.provider.clone(),
            model,
            prompt: request.prompt.clone(),
            response: response.content.clone(),
            rag_used,
            mcp_used,
            status: "success".to_string(),
            duration_ms: started.elapsed().as_millis() as i32,
            timestamp: Utc::now(),
        });

        Ok(response)
    }

    async fn fetch_knowledge(&self, request: &ChatRequest) -> Option<String> {
        if !request.use_rag {
            return None;
        }

        let phrase = sanitize_search_phrase(&request.prompt);
        if phrase.is_empty() {
            return None;
        }

        match self.knowledge.search(&phrase, MAX_CONTEXT_ENTRIES).await {
            Ok(entries) => build_knowledge_block(&entries),
            Err(e) => {
                tracing::warn!(
                    request_id = %get_request_id(),
                    error = %e,
                    "Knowledge lookup failed, continuing without augmentation"
                );
                None
            }
        }
    }

    async fn fetch_tool_context(&self, request: &ChatRequest) -> Option<String> {
        if !request.use_mcp {
            return None;
        }

        let servers = match self.mcp_directory.resolve(request.mcp_servers.as_deref()).await {
            Ok(servers) => servers,
            Err(e) => {
                tracing::warn!(
                    request_id = %get_request_id(),
                    error = %e,
                    "MCP server lookup failed, continuing without tool context"
                );
                return None;
            }
        };

        if servers.is_empty() {
            return None;
        }

        let contexts = self.mcp_client.gather(&servers, &request.prompt).await;
        build_tool_block(&contexts)
    }
}

fn collect_images(request: &ChatRequest) -> Vec<String> {
    let mut images = request.images.clone().unwrap_or_default();
    if let Some(url) = &request.image_url {
        images.push(url.clone());
    }
    images
}
