//! Language model boundary.
//!
//! A [`ModelInvoker`] is stateless: every call carries the full transcript,
//! so the orchestrator stays the single owner of conversation state.

pub mod error;

pub use error::ApiError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::app::conversation::{ConversationId, Role};

/// A callable tool declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool call emitted by the model within one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id assigned by the model.
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome of one tool call. Exactly one is produced per [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One prior exchange in the conversation, as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverseRequest {
    pub conversation_id: ConversationId,
    pub system_prompt: String,
    pub transcript: Vec<TranscriptEntry>,
    pub message: String,
    pub tools: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelReply {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    /// The model stopped because it wants tools executed.
    #[serde(default)]
    pub requires_tools: bool,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            requires_tools: false,
        }
    }

    pub fn tool_use(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            requires_tools: true,
        }
    }

    pub fn needs_tools(&self) -> bool {
        self.requires_tools && !self.tool_calls.is_empty()
    }
}

/// Second call of a turn: the first request, what the model asked for,
/// and one result per requested tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationRequest {
    pub turn: ConverseRequest,
    pub reply: ModelReply,
    pub tool_results: Vec<ToolCallResult>,
}

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn converse(
        &self,
        request: ConverseRequest,
        token: CancellationToken,
    ) -> Result<ModelReply, ApiError>;

    /// Fold tool results back and obtain the final text. No further tool
    /// use is offered to the model.
    async fn continue_with_tool_results(
        &self,
        request: ContinuationRequest,
        token: CancellationToken,
    ) -> Result<String, ApiError>;

    /// Drop any provider-side state held for the conversation.
    async fn forget(&self, _conversation_id: ConversationId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn needs_tools_requires_both_stop_reason_and_calls() {
        assert!(!ModelReply::text("done").needs_tools());
        assert!(!ModelReply::tool_use("", Vec::new()).needs_tools());

        let reply = ModelReply {
            text: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: "searchAll".to_string(),
                input: json!({"query": "q"}),
            }],
            requires_tools: false,
        };
        assert!(!reply.needs_tools());

        let reply = ModelReply {
            requires_tools: true,
            ..reply
        };
        assert!(reply.needs_tools());
    }

    #[test]
    fn failed_result_carries_no_payload() {
        let result = ToolCallResult::failure("call_1", "boom");
        assert!(result.is_error());
        assert_eq!(result.payload, None);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"id": "call_1", "error": "boom"})
        );
    }
}
