//! Test utilities for scout-core
//!
//! Scriptable backends and a scripted model invoker, usable from other
//! crates through the `test-utils` feature.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ContinuationRequest, ConverseRequest, ModelInvoker, ModelReply};
use crate::app::conversation::ConversationId;
use crate::config::{ServiceConfig, ServiceId};
use crate::mcp::{
    Capability, ContentChunk, InvocationOutput, McpError, McpSession, ResourceInfo,
    SessionConnector,
};

pub use crate::auth::InMemoryCredentialProvider;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What a fake backend exposes once connected.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    pub capabilities: Vec<Capability>,
    /// Text chunks returned by every capability invocation.
    pub chunks: Vec<ContentChunk>,
    pub resources: Vec<ResourceInfo>,
    /// Every invocation fails with this message.
    pub invoke_error: Option<String>,
    /// Invocations wait this long before answering.
    pub invoke_delay: Option<Duration>,
    /// Closing the session fails with this message. The session still ends up
    /// closed.
    pub close_error: Option<String>,
}

impl FakeBackend {
    /// A backend with a `search` capability returning the given text chunks.
    pub fn searchable<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: vec![Capability::new("search")],
            chunks: texts
                .into_iter()
                .map(|text| ContentChunk::Text(text.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// A backend with no search-like capability, only listable resources.
    pub fn resources_only(resources: Vec<ResourceInfo>) -> Self {
        Self {
            capabilities: vec![Capability::new("fetch")],
            resources,
            ..Self::default()
        }
    }

    pub fn failing_invocations(message: impl Into<String>) -> Self {
        Self {
            capabilities: vec![Capability::new("search")],
            invoke_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    pub fn failing_close(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }
}

pub struct FakeSession {
    service: ServiceId,
    backend: FakeBackend,
    alive: AtomicBool,
    closed: AtomicBool,
    invocations: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl FakeSession {
    fn new(service: ServiceId, backend: FakeBackend) -> Self {
        Self {
            service,
            backend,
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// Simulate the remote end going away.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<(String, Map<String, Value>)> {
        lock(&self.invocations).clone()
    }

    fn check_alive(&self) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpError::ListCapabilitiesFailed {
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_capabilities(&self) -> Result<Vec<Capability>, McpError> {
        self.check_alive()?;
        Ok(self.backend.capabilities.clone())
    }

    async fn invoke_capability(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<InvocationOutput, McpError> {
        self.check_alive()?;
        lock(&self.invocations).push((name.to_string(), arguments));
        if let Some(delay) = self.backend.invoke_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.backend.invoke_error {
            return Err(McpError::InvocationFailed {
                name: name.to_string(),
                message: message.clone(),
            });
        }
        Ok(InvocationOutput {
            content: self.backend.chunks.clone(),
            is_error: false,
        })
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        self.check_alive()?;
        Ok(self.backend.resources.clone())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        match &self.backend.close_error {
            Some(message) => Err(McpError::CloseFailed {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Connector producing [`FakeSession`]s, with per-service bookkeeping.
#[derive(Default)]
pub struct FakeConnector {
    backends: HashMap<ServiceId, FakeBackend>,
    refusing: HashMap<ServiceId, String>,
    connect_delay: Duration,
    connects: Mutex<HashMap<ServiceId, usize>>,
    authorizations: Mutex<HashMap<ServiceId, String>>,
    sessions: Mutex<HashMap<ServiceId, Vec<Arc<FakeSession>>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, service: ServiceId, backend: FakeBackend) -> Self {
        self.backends.insert(service, backend);
        self
    }

    /// Connecting to `service` fails with a connection error.
    pub fn refusing(mut self, service: ServiceId, message: impl Into<String>) -> Self {
        self.refusing.insert(service, message.into());
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Number of connect calls that reached the connector for `service`.
    pub fn connect_count(&self, service: ServiceId) -> usize {
        lock(&self.connects).get(&service).copied().unwrap_or(0)
    }

    pub fn last_authorization(&self, service: ServiceId) -> Option<String> {
        lock(&self.authorizations).get(&service).cloned()
    }

    /// Every session opened for `service`, oldest first.
    pub fn sessions(&self, service: ServiceId) -> Vec<Arc<FakeSession>> {
        lock(&self.sessions)
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }

    pub fn kill_sessions(&self, service: ServiceId) {
        for session in self.sessions(service) {
            session.kill();
        }
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(
        &self,
        config: &ServiceConfig,
        authorization: &str,
    ) -> Result<Arc<dyn McpSession>, McpError> {
        *lock(&self.connects).entry(config.id).or_insert(0) += 1;
        lock(&self.authorizations).insert(config.id, authorization.to_string());

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if let Some(message) = self.refusing.get(&config.id) {
            return Err(McpError::ConnectionFailed {
                service: config.id,
                message: message.clone(),
            });
        }

        let backend = self.backends.get(&config.id).cloned().unwrap_or_default();
        let session = Arc::new(FakeSession::new(config.id, backend));
        lock(&self.sessions)
            .entry(config.id)
            .or_default()
            .push(session.clone());
        Ok(session)
    }
}

/// Model invoker replaying queued replies and recording what it was sent.
#[derive(Default)]
pub struct ScriptedInvoker {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    finals: Mutex<VecDeque<String>>,
    converse_requests: Mutex<Vec<ConverseRequest>>,
    continuations: Mutex<Vec<ContinuationRequest>>,
    forgotten: Mutex<Vec<ConversationId>>,
    reply_delay: Duration,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every converse call waits this long before answering.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn push_reply(&self, reply: ModelReply) -> &Self {
        lock(&self.replies).push_back(Ok(reply));
        self
    }

    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.replies).push_back(Err(message.into()));
        self
    }

    pub fn push_final(&self, text: impl Into<String>) -> &Self {
        lock(&self.finals).push_back(text.into());
        self
    }

    pub fn converse_requests(&self) -> Vec<ConverseRequest> {
        lock(&self.converse_requests).clone()
    }

    pub fn continuations(&self) -> Vec<ContinuationRequest> {
        lock(&self.continuations).clone()
    }

    /// Total calls across both phases of a turn.
    pub fn call_count(&self) -> usize {
        lock(&self.converse_requests).len() + lock(&self.continuations).len()
    }

    pub fn forgotten(&self) -> Vec<ConversationId> {
        lock(&self.forgotten).clone()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn converse(
        &self,
        request: ConverseRequest,
        token: CancellationToken,
    ) -> Result<ModelReply, ApiError> {
        lock(&self.converse_requests).push(request);
        if !self.reply_delay.is_zero() {
            tokio::time::sleep(self.reply_delay).await;
        }
        if token.is_cancelled() {
            return Err(ApiError::Cancelled {
                provider: self.name().to_string(),
            });
        }
        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(details)) => Err(ApiError::Unknown {
                provider: self.name().to_string(),
                details,
            }),
            None => Ok(ModelReply::text("")),
        }
    }

    async fn continue_with_tool_results(
        &self,
        request: ContinuationRequest,
        token: CancellationToken,
    ) -> Result<String, ApiError> {
        lock(&self.continuations).push(request);
        if token.is_cancelled() {
            return Err(ApiError::Cancelled {
                provider: self.name().to_string(),
            });
        }
        Ok(lock(&self.finals).pop_front().unwrap_or_default())
    }

    async fn forget(&self, conversation_id: ConversationId) {
        lock(&self.forgotten).push(conversation_id);
    }
}
