//! Anthropic Messages API adapter for the model invoker boundary.

use async_trait::async_trait;
use reqwest::{self, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scout_core::api::{
    ApiError, ContinuationRequest, ConverseRequest, ModelInvoker, ModelReply, ToolCallRequest,
    ToolCallResult, ToolDeclaration,
};
use scout_core::app::Role;
use scout_core::config::ModelConfig;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const STOP_REASON_TOOL_USE: &str = "tool_use";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Display)]
pub enum ClaudeMessageRole {
    #[serde(rename = "user")]
    #[strum(serialize = "user")]
    User,
    #[serde(rename = "assistant")]
    #[strum(serialize = "assistant")]
    Assistant,
}

impl From<Role> for ClaudeMessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ClaudeMessageRole::User,
            Role::Assistant => ClaudeMessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaudeMessage {
    pub role: ClaudeMessageRole,
    #[serde(flatten)]
    pub content: ClaudeMessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClaudeMessageContent {
    Text { content: String },
    StructuredContent { content: Vec<ClaudeContentBlock> },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: Value,
}

impl From<&ToolDeclaration> for ClaudeTool {
    fn from(declaration: &ToolDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            description: declaration.description.clone(),
            input_schema: declaration.input_schema.clone(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ToolChoice {
    Auto,
    None,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ClaudeTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Deserialize)]
struct ClaudeCompletionResponse {
    content: Vec<ClaudeContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Talks to Claude. The API key is looked up when a request is made, so
/// commands that never reach the model work without one.
#[derive(Clone)]
pub struct ClaudeInvoker {
    http_client: reqwest::Client,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeInvoker {
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static("2023-06-01"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Read the API key from the environment variable named in the config.
    pub fn from_env(config: &ModelConfig) -> Result<Self, ApiError> {
        Self::new(config, std::env::var(&config.api_key_env).ok())
    }

    fn api_key(&self) -> Result<&str, ApiError> {
        self.api_key.as_deref().ok_or_else(|| {
            ApiError::Configuration(format!(
                "{} is not set; it is required for chat",
                self.api_key_env
            ))
        })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        token: &CancellationToken,
    ) -> Result<ClaudeCompletionResponse, ApiError> {
        let request_builder = self
            .http_client
            .post(API_URL)
            .header("x-api-key", self.api_key()?)
            .json(request);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "claude::send", "Cancellation token triggered before sending request.");
                return Err(ApiError::Cancelled { provider: self.name().to_string() });
            }
            res = request_builder.send() => {
                res?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(target: "claude::send", "Cancellation token triggered while reading error response body.");
                    return Err(ApiError::Cancelled { provider: self.name().to_string() });
                }
                text_res = response.text() => {
                    text_res?
                }
            };
            return Err(map_status(self.name(), status.as_u16(), error_text));
        }

        let response_text = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "claude::send", "Cancellation token triggered while reading response body.");
                return Err(ApiError::Cancelled { provider: self.name().to_string() });
            }
            text_res = response.text() => {
                text_res?
            }
        };

        serde_json::from_str(&response_text).map_err(|e| ApiError::ResponseParsingError {
            provider: self.name().to_string(),
            details: format!("Error: {e}, Body: {response_text}"),
        })
    }
}

#[async_trait]
impl ModelInvoker for ClaudeInvoker {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn converse(
        &self,
        request: ConverseRequest,
        token: CancellationToken,
    ) -> Result<ModelReply, ApiError> {
        let completion = CompletionRequest {
            model: self.model.clone(),
            messages: turn_messages(&request),
            max_tokens: self.max_tokens,
            system: system_prompt(&request),
            tools: request.tools.iter().map(ClaudeTool::from).collect(),
            tool_choice: (!request.tools.is_empty()).then_some(ToolChoice::Auto),
        };

        let response = self.send(&completion, &token).await?;
        Ok(to_reply(response))
    }

    async fn continue_with_tool_results(
        &self,
        request: ContinuationRequest,
        token: CancellationToken,
    ) -> Result<String, ApiError> {
        let mut messages = turn_messages(&request.turn);
        messages.push(ClaudeMessage {
            role: ClaudeMessageRole::Assistant,
            content: ClaudeMessageContent::StructuredContent {
                content: assistant_blocks(&request.reply.text, &request.reply.tool_calls),
            },
        });
        messages.push(ClaudeMessage {
            role: ClaudeMessageRole::User,
            content: ClaudeMessageContent::StructuredContent {
                content: request.tool_results.iter().map(tool_result_block).collect(),
            },
        });

        // Tool declarations must accompany tool_use history; `none` keeps
        // the model from asking for another round.
        let completion = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            system: system_prompt(&request.turn),
            tools: request.turn.tools.iter().map(ClaudeTool::from).collect(),
            tool_choice: Some(ToolChoice::None),
        };

        let response = self.send(&completion, &token).await?;
        Ok(to_reply(response).text)
    }
}

fn map_status(provider: &str, status: u16, details: String) -> ApiError {
    let provider = provider.to_string();
    match status {
        401 | 403 => ApiError::AuthenticationFailed { provider, details },
        429 => ApiError::RateLimited { provider, details },
        400..=499 => ApiError::InvalidRequest { provider, details },
        500..=599 => ApiError::ServerError {
            provider,
            status_code: status,
            details,
        },
        _ => ApiError::Unknown { provider, details },
    }
}

fn system_prompt(request: &ConverseRequest) -> Option<String> {
    Some(request.system_prompt.clone()).filter(|prompt| !prompt.trim().is_empty())
}

fn turn_messages(request: &ConverseRequest) -> Vec<ClaudeMessage> {
    request
        .transcript
        .iter()
        .filter(|entry| !entry.content.is_empty())
        .map(|entry| ClaudeMessage {
            role: entry.role.into(),
            content: ClaudeMessageContent::Text {
                content: entry.content.clone(),
            },
        })
        .chain(std::iter::once(ClaudeMessage {
            role: ClaudeMessageRole::User,
            content: ClaudeMessageContent::Text {
                content: request.message.clone(),
            },
        }))
        .collect()
}

fn assistant_blocks(text: &str, tool_calls: &[ToolCallRequest]) -> Vec<ClaudeContentBlock> {
    let text_block = (!text.is_empty()).then(|| ClaudeContentBlock::Text {
        text: text.to_string(),
    });
    text_block
        .into_iter()
        .chain(tool_calls.iter().map(|call| ClaudeContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        }))
        .collect()
}

fn tool_result_block(result: &ToolCallResult) -> ClaudeContentBlock {
    match (&result.error, &result.payload) {
        (Some(error), _) => ClaudeContentBlock::ToolResult {
            tool_use_id: result.id.clone(),
            content: error.clone(),
            is_error: Some(true),
        },
        (None, Some(payload)) => ClaudeContentBlock::ToolResult {
            tool_use_id: result.id.clone(),
            content: payload.to_string(),
            is_error: None,
        },
        (None, None) => ClaudeContentBlock::ToolResult {
            tool_use_id: result.id.clone(),
            content: String::new(),
            is_error: None,
        },
    }
}

fn to_reply(response: ClaudeCompletionResponse) -> ModelReply {
    let mut text = Vec::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ClaudeContentBlock::Text { text: t } => text.push(t),
            ClaudeContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCallRequest { id, name, input });
            }
            ClaudeContentBlock::ToolResult { .. } | ClaudeContentBlock::Unknown => {}
        }
    }

    ModelReply {
        text: text.join(""),
        tool_calls,
        requires_tools: response.stop_reason.as_deref() == Some(STOP_REASON_TOOL_USE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use scout_core::api::TranscriptEntry;
    use scout_core::app::ConversationId;
    use serde_json::json;

    fn request() -> ConverseRequest {
        ConverseRequest {
            conversation_id: ConversationId::new(),
            system_prompt: "Be helpful.".to_string(),
            transcript: vec![
                TranscriptEntry {
                    role: Role::User,
                    content: "earlier".to_string(),
                },
                TranscriptEntry {
                    role: Role::Assistant,
                    content: "reply".to_string(),
                },
            ],
            message: "now".to_string(),
            tools: Vec::new(),
        }
    }

    #[test]
    fn transcript_is_followed_by_the_new_message() {
        let messages = turn_messages(&request());
        let rendered = serde_json::to_value(&messages).unwrap();
        assert_eq!(
            rendered,
            json!([
                {"role": "user", "content": "earlier"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "now"},
            ])
        );
    }

    #[test]
    fn tool_use_response_requires_tools() {
        let response: ClaudeCompletionResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Searching."},
                {"type": "tool_use", "id": "toolu_1", "name": "searchAll", "input": {"query": "q"}},
                {"type": "thinking", "thinking": "...", "signature": "sig"}
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();

        let reply = to_reply(response);
        assert!(reply.needs_tools());
        assert_eq!(reply.text, "Searching.");
        assert_eq!(reply.tool_calls[0].id, "toolu_1");
        assert_eq!(reply.tool_calls[0].input, json!({"query": "q"}));
    }

    #[test]
    fn end_turn_response_is_final() {
        let response: ClaudeCompletionResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Done."}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert!(!to_reply(response).needs_tools());
    }

    #[test]
    fn failed_tool_results_are_flagged() {
        let block = tool_result_block(&ToolCallResult::failure("toolu_1", "timeout"));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "timeout", "is_error": true})
        );

        let block = tool_result_block(&ToolCallResult::success("toolu_2", json!([])));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "toolu_2", "content": "[]"})
        );
    }

    #[rstest]
    #[case(401, "AuthenticationFailed")]
    #[case(403, "AuthenticationFailed")]
    #[case(429, "RateLimited")]
    #[case(404, "InvalidRequest")]
    #[case(503, "ServerError")]
    #[case(302, "Unknown")]
    fn status_codes_map_to_api_errors(#[case] status: u16, #[case] expected: &str) {
        let err = map_status("anthropic", status, "details".to_string());
        assert!(format!("{err:?}").starts_with(expected), "{err:?}");
    }

    #[test]
    fn continuation_disables_further_tool_use() {
        let request = CompletionRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            max_tokens: 1,
            system: None,
            tools: Vec::new(),
            tool_choice: Some(ToolChoice::None),
        };
        let rendered = serde_json::to_value(&request).unwrap();
        assert_eq!(rendered["tool_choice"], json!({"type": "none"}));
        assert!(rendered.get("tools").is_none());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let invoker = ClaudeInvoker::new(&ModelConfig::default(), None).unwrap();
        let err = invoker
            .converse(request(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Configuration(msg) if msg.contains("ANTHROPIC_API_KEY")));
    }
}
