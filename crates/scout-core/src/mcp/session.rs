//! Protocol session seam.
//!
//! The connection manager only ever talks to backends through these traits,
//! so the concrete MCP client can be swapped for fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::McpError;
use crate::config::{ServiceConfig, ServiceId};

/// A named, schema-described operation a backend session exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: Value::Object(Map::new()),
        }
    }
}

/// One chunk of a capability response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChunk {
    Text(String),
    /// Image, audio or embedded resource content; not searchable text.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationOutput {
    pub content: Vec<ContentChunk>,
    pub is_error: bool,
}

impl InvocationOutput {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|chunk| match chunk {
                ContentChunk::Text(text) => Some(text.as_str()),
                ContentChunk::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A generic item a backend exposes through resource listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An established, authenticated connection to one backend.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_capabilities(&self) -> Result<Vec<Capability>, McpError>;

    async fn invoke_capability(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<InvocationOutput, McpError>;

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// Opens protocol sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        config: &ServiceConfig,
        authorization: &str,
    ) -> Result<Arc<dyn McpSession>, McpError>;
}

/// Borrowed access to a session owned by the connection manager.
///
/// A lease can list and invoke capabilities but cannot close the session;
/// teardown stays with the manager.
#[derive(Clone)]
pub struct SessionLease {
    service: ServiceId,
    session: Arc<dyn McpSession>,
}

impl SessionLease {
    pub(crate) fn new(service: ServiceId, session: Arc<dyn McpSession>) -> Self {
        Self { service, session }
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub async fn list_capabilities(&self) -> Result<Vec<Capability>, McpError> {
        self.session.list_capabilities().await
    }

    pub async fn invoke_capability(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<InvocationOutput, McpError> {
        self.session.invoke_capability(name, arguments).await
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        self.session.list_resources().await
    }

    /// True when both leases point at the same underlying session.
    pub fn same_session(&self, other: &SessionLease) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
