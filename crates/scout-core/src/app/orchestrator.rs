//! Conversation turns between the model and the search backends.
//!
//! A turn calls the model at most twice: once with the tool declarations,
//! and once more with the tool results if the model asked for tools. There
//! is no further round of tool use within the same turn.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::conversation::{Conversation, ConversationId, Message};
use super::dispatch::{DispatchOutcome, ToolDispatcher};
use super::store::{ConversationStats, ConversationStore};
use super::tools::SearchTool;
use crate::api::{ContinuationRequest, ConverseRequest, ModelInvoker};
use crate::config::ServiceId;
use crate::error::{Error, Result};
use crate::search::{SearchAggregator, SearchResult};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Scout, an assistant that answers questions \
using the team's knowledge sources. Use the search tools to look things up before answering \
questions about documents, pages, projects or issues. Cite the source of each fact you use. \
If nothing relevant is found, say so plainly instead of guessing.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub tools_used: Vec<String>,
    /// Present when the turn executed tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResult>>,
    pub conversation_id: ConversationId,
}

pub struct ToolOrchestrator {
    store: ConversationStore,
    invoker: Arc<dyn ModelInvoker>,
    dispatcher: ToolDispatcher,
    system_prompt: RwLock<String>,
}

impl ToolOrchestrator {
    pub fn new(invoker: Arc<dyn ModelInvoker>, aggregator: Arc<SearchAggregator>) -> Self {
        Self {
            store: ConversationStore::new(),
            invoker,
            dispatcher: ToolDispatcher::new(aggregator),
            system_prompt: RwLock::new(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: RwLock::new(prompt.into()),
            ..self
        }
    }

    fn services(&self) -> &[ServiceId] {
        self.dispatcher.aggregator().services()
    }

    pub async fn create_conversation(&self) -> ConversationId {
        let id = self.store.create().await;
        debug!(target: "app::orchestrator", conversation_id = %id, "Created conversation");
        id
    }

    /// Run one chat turn.
    ///
    /// Turns on the same conversation run one after another; turns on
    /// different conversations run independently.
    #[instrument(skip(self, message, token), fields(conversation_id))]
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ConversationId>,
        token: CancellationToken,
    ) -> Result<ChatResponse> {
        if message.trim().is_empty() {
            return Err(Error::validation("Message cannot be empty"));
        }
        let received_at = Utc::now();

        let id = match conversation_id {
            Some(id) => id,
            None => self.store.create().await,
        };
        tracing::Span::current().record("conversation_id", tracing::field::display(id));
        let entry = self
            .store
            .entry(id)
            .await
            .ok_or(Error::ConversationNotFound(id))?;

        let _turn = entry.begin_turn().await;
        let transcript = entry.snapshot().await.transcript();

        let request = ConverseRequest {
            conversation_id: id,
            system_prompt: self.system_prompt().await,
            transcript,
            message: message.to_string(),
            tools: SearchTool::declarations(self.services()),
        };

        let reply = self
            .invoker
            .converse(request.clone(), token.clone())
            .await?;

        let (response, tools_used, search_results) = if reply.needs_tools() {
            info!(
                target: "app::orchestrator",
                calls = reply.tool_calls.len(),
                "Model requested tools"
            );
            let DispatchOutcome {
                results,
                tools_used,
                search_results,
            } = self.dispatcher.dispatch_all(&reply.tool_calls, &token).await;

            let response = self
                .invoker
                .continue_with_tool_results(
                    ContinuationRequest {
                        turn: request,
                        reply,
                        tool_results: results,
                    },
                    token,
                )
                .await?;
            (response, tools_used, Some(search_results))
        } else {
            (reply.text, Vec::new(), None)
        };

        entry
            .append([
                Message::user(message).at(received_at),
                Message::assistant(response.clone(), tools_used.clone()),
            ])
            .await;

        info!(
            target: "app::orchestrator",
            tools_used = tools_used.len(),
            "Turn complete"
        );

        Ok(ChatResponse {
            response,
            tools_used,
            search_results,
            conversation_id: id,
        })
    }

    pub async fn get_conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.store.get(id).await
    }

    pub async fn list_conversations(&self) -> Vec<Conversation> {
        self.store.list().await
    }

    /// Remove a conversation and let the model invoker drop any state it
    /// keeps for it. Returns whether the conversation existed.
    pub async fn clear_conversation(&self, id: ConversationId) -> bool {
        let removed = self.store.remove(id).await;
        self.invoker.forget(id).await;
        removed
    }

    pub async fn clear_all(&self) {
        for id in self.store.clear().await {
            self.invoker.forget(id).await;
        }
    }

    pub async fn stats(&self) -> ConversationStats {
        self.store.stats().await
    }

    /// Applies to every subsequent turn.
    pub async fn set_system_prompt(&self, prompt: impl Into<String>) {
        *self.system_prompt.write().await = prompt.into();
    }

    pub async fn system_prompt(&self) -> String {
        self.system_prompt.read().await.clone()
    }
}
