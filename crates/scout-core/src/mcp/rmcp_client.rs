//! MCP sessions over streamable HTTP using the official rmcp crate.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, RawContent},
    service::{Peer, RoleClient, RunningService, ServiceError},
    transport::{
        StreamableHttpClientTransport, streamable_http_client::StreamableHttpClientTransportConfig,
    },
};

use super::{
    Capability, ContentChunk, InvocationOutput, McpError, McpSession, ResourceInfo,
    SessionConnector,
};
use crate::config::{ServiceConfig, ServiceId, TimeoutConfig};

/// Connects to backends over MCP streamable HTTP.
#[derive(Debug, Clone)]
pub struct RmcpConnector {
    connect_timeout: Duration,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl Default for RmcpConnector {
    fn default() -> Self {
        Self::new(&TimeoutConfig::default())
    }
}

impl RmcpConnector {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        Self {
            connect_timeout: timeouts.connect(),
            list_timeout: timeouts.list(),
            call_timeout: timeouts.call(),
        }
    }

    fn http_client(
        &self,
        config: &ServiceConfig,
        authorization: &str,
    ) -> Result<reqwest::Client, McpError> {
        let mut value = HeaderValue::from_str(authorization).map_err(|e| {
            McpError::ConnectionFailed {
                service: config.id,
                message: format!("Invalid authorization header: {e}"),
            }
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.client_name.clone())
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| McpError::ConnectionFailed {
                service: config.id,
                message: format!("Failed to build HTTP client: {e}"),
            })
    }
}

#[async_trait]
impl SessionConnector for RmcpConnector {
    async fn connect(
        &self,
        config: &ServiceConfig,
        authorization: &str,
    ) -> Result<Arc<dyn McpSession>, McpError> {
        let http_client = self.http_client(config, authorization)?;
        let transport = StreamableHttpClientTransport::with_client(
            http_client,
            StreamableHttpClientTransportConfig::with_uri(config.endpoint.clone()),
        );

        let client = tokio::time::timeout(self.connect_timeout, ().serve(transport))
            .await
            .map_err(|_| McpError::ConnectTimeout { service: config.id })?
            .map_err(|e| {
                error!(target: "mcp::rmcp", service = %config.id, "Failed to serve MCP: {}", e);
                McpError::ConnectionFailed {
                    service: config.id,
                    message: format!("Failed to initialize MCP client: {e}"),
                }
            })?;

        info!(
            target: "mcp::rmcp",
            service = %config.id,
            endpoint = %config.endpoint,
            "Connected to server: {:?}",
            client.peer_info()
        );

        Ok(Arc::new(RmcpSession {
            service: config.id,
            peer: client.peer().clone(),
            running: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
            list_timeout: self.list_timeout,
            call_timeout: self.call_timeout,
        }))
    }
}

/// Calls go through a cloned peer so that `close` never waits behind an
/// in-flight request; cancelling the running service fails those requests.
struct RmcpSession {
    service: ServiceId,
    peer: Peer<RoleClient>,
    running: Mutex<Option<RunningService<RoleClient, ()>>>,
    closed: AtomicBool,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl RmcpSession {
    fn peer(&self) -> Result<&Peer<RoleClient>, McpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpError::Closed);
        }
        Ok(&self.peer)
    }
}

/// Run a tool call, giving up after `limit`.
async fn bounded_call<T>(
    service: ServiceId,
    name: &str,
    limit: Duration,
    call: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, McpError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|e| McpError::InvocationFailed {
            name: name.to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            warn!(target: "mcp::rmcp", service = %service, "Tool '{}' timed out after {:?}", name, limit);
            Err(McpError::InvocationTimeout {
                service,
                name: name.to_string(),
            })
        }
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_capabilities(&self) -> Result<Vec<Capability>, McpError> {
        let peer = self.peer()?;

        let tool_list = tokio::time::timeout(self.list_timeout, peer.list_tools(Default::default()))
            .await
            .map_err(|_| McpError::ListCapabilitiesTimeout {
                service: self.service,
            })?
            .map_err(|e| McpError::ListCapabilitiesFailed {
                message: e.to_string(),
            })?;

        debug!(
            target: "mcp::rmcp",
            service = %self.service,
            "Discovered {} tools",
            tool_list.tools.len()
        );

        Ok(tool_list
            .tools
            .into_iter()
            .map(|tool| Capability {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(|d| d.to_string()),
                input_schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn invoke_capability(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<InvocationOutput, McpError> {
        let peer = self.peer()?;

        debug!(target: "mcp::rmcp", service = %self.service, "Calling tool '{}'", name);

        let result = bounded_call(
            self.service,
            name,
            self.call_timeout,
            peer.call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            }),
        )
        .await?;

        let content = result
            .content
            .into_iter()
            .flatten()
            .map(|content| match content.raw {
                RawContent::Text(text_content) => ContentChunk::Text(text_content.text),
                _ => ContentChunk::Other,
            })
            .collect();

        Ok(InvocationOutput {
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        let peer = self.peer()?;

        let listing = tokio::time::timeout(
            self.list_timeout,
            peer.list_resources(Default::default()),
        )
        .await
        .map_err(|_| McpError::ListResourcesFailed {
            message: "timed out".to_string(),
        })?
        .map_err(|e| McpError::ListResourcesFailed {
            message: e.to_string(),
        })?;

        Ok(listing
            .resources
            .into_iter()
            .map(|resource| {
                let raw = resource.raw;
                ResourceInfo {
                    uri: raw.uri,
                    name: Some(raw.name).filter(|name| !name.is_empty()),
                    description: raw.description,
                }
            })
            .collect())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::Release);
        let running = self.running.lock().await.take();
        if let Some(client) = running {
            client.cancel().await.map_err(|e| McpError::CloseFailed {
                message: e.to_string(),
            })?;
            debug!(target: "mcp::rmcp", service = %self.service, "Session closed");
        }
        Ok(())
    }
}
