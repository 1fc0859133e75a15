//! The operation surface consumed by front ends.
//!
//! One `ScoutService` is built at startup and shared by handle; it owns the
//! connection manager, the search aggregator and the orchestrator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::api::ModelInvoker;
use crate::app::{
    ChatResponse, Conversation, ConversationId, ConversationStats, ToolOrchestrator,
};
use crate::auth::CredentialProvider;
use crate::config::{ScoutConfig, ServiceConfig, ServiceId};
use crate::error::{Error, Result};
use crate::mcp::{ConnectionManager, ConnectionStatus, SessionConnector};
use crate::search::{BackendInvoker, CapabilitySelector, KeywordSelector, SearchAggregator, SearchResult};
use crate::utils::join_settled;

/// Connection state of one service, as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service: ServiceId,
    pub connected: bool,
    pub needs_auth: bool,
}

pub struct ScoutService {
    connections: Arc<ConnectionManager>,
    aggregator: Arc<SearchAggregator>,
    orchestrator: ToolOrchestrator,
}

impl ScoutService {
    pub fn new(
        config: &ScoutConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn SessionConnector>,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Self {
        Self::with_selector(
            config,
            credentials,
            connector,
            invoker,
            Arc::new(KeywordSelector::default()),
        )
    }

    pub fn with_selector(
        config: &ScoutConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn SessionConnector>,
        invoker: Arc<dyn ModelInvoker>,
        selector: Arc<dyn CapabilitySelector>,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            config.services.clone(),
            credentials,
            connector,
        ));
        let backend = Arc::new(BackendInvoker::with_selector(connections.clone(), selector));
        let aggregator = Arc::new(SearchAggregator::new(
            backend,
            connections.services().to_vec(),
        ));

        let mut orchestrator = ToolOrchestrator::new(invoker, aggregator.clone());
        if let Some(prompt) = &config.system_prompt {
            orchestrator = orchestrator.with_system_prompt(prompt.clone());
        }

        Self {
            connections,
            aggregator,
            orchestrator,
        }
    }

    pub fn services(&self) -> &[ServiceId] {
        self.connections.services()
    }

    pub fn service_config(&self, service: ServiceId) -> Option<&ServiceConfig> {
        self.connections.config(service)
    }

    /// Search every backend directly, without the model.
    pub async fn search(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        self.aggregator.search_all(query, token).await
    }

    /// Search a single backend. Failures are returned, not swallowed.
    pub async fn search_service(&self, service: ServiceId, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("Query cannot be empty"));
        }
        self.aggregator.invoker().search(service, query).await
    }

    /// Per-service connection and authorization state, in configuration
    /// order. Stale sessions found along the way are evicted.
    pub async fn oauth_status(&self) -> Vec<ServiceStatus> {
        let probes = self.services().iter().map(|&service| async move {
            let status = match self.connections.probe(service).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(target: "service", service = %service, "Status probe failed: {}", e);
                    ConnectionStatus::DISCONNECTED
                }
            };
            ServiceStatus {
                service,
                connected: status.connected,
                needs_auth: status.needs_auth,
            }
        });
        futures::future::join_all(probes).await
    }

    #[instrument(skip(self), fields(service = %service))]
    pub async fn initialize_service(&self, service: ServiceId) -> Result<()> {
        self.connections
            .acquire(service)
            .await
            .map(|_| ())
            .map_err(|e| Error::backend(service, e))
    }

    /// Connect every service concurrently; one failure does not affect the
    /// others.
    pub async fn initialize_all(&self, token: &CancellationToken) -> Vec<(ServiceId, Result<()>)> {
        let branches = self.services().iter().map(|&service| {
            let connections = self.connections.clone();
            (service, async move {
                connections
                    .acquire(service)
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::backend(service, e))
            })
        });

        let outcomes = join_settled(branches, token).await;
        let connected = outcomes.iter().filter(|(_, o)| o.is_ok()).count();
        info!(target: "service", connected, total = outcomes.len(), "Initialized services");
        outcomes
    }

    pub async fn disconnect(&self, service: ServiceId) -> Result<()> {
        self.connections
            .release(service)
            .await
            .map_err(|e| Error::backend(service, e))
    }

    /// Returns the services that failed to disconnect cleanly.
    pub async fn disconnect_all(&self) -> Vec<(ServiceId, Error)> {
        self.connections
            .release_all()
            .await
            .into_iter()
            .map(|(service, e)| (service, Error::backend(service, e)))
            .collect()
    }

    pub async fn create_conversation(&self) -> ConversationId {
        self.orchestrator.create_conversation().await
    }

    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ConversationId>,
        token: CancellationToken,
    ) -> Result<ChatResponse> {
        self.orchestrator.chat(message, conversation_id, token).await
    }

    pub async fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.orchestrator
            .get_conversation(id)
            .await
            .ok_or(Error::ConversationNotFound(id))
    }

    pub async fn list_conversations(&self) -> Vec<Conversation> {
        self.orchestrator.list_conversations().await
    }

    pub async fn clear_conversation(&self, id: ConversationId) -> Result<()> {
        if self.orchestrator.clear_conversation(id).await {
            Ok(())
        } else {
            Err(Error::ConversationNotFound(id))
        }
    }

    pub async fn clear_all_conversations(&self) {
        self.orchestrator.clear_all().await;
    }

    pub async fn stats(&self) -> ConversationStats {
        self.orchestrator.stats().await
    }

    pub async fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.orchestrator.set_system_prompt(prompt).await;
    }

    pub async fn system_prompt(&self) -> String {
        self.orchestrator.system_prompt().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ModelReply, ToolCallRequest};
    use crate::app::Role;
    use crate::auth::{AccessToken, InMemoryCredentialProvider};
    use crate::mcp::ResourceInfo;
    use crate::test_utils::{FakeBackend, FakeConnector, ScriptedInvoker};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        service: Arc<ScoutService>,
        connector: Arc<FakeConnector>,
        invoker: Arc<ScriptedInvoker>,
    }

    fn fixture(connector: FakeConnector, credentials: InMemoryCredentialProvider) -> Fixture {
        let connector = Arc::new(connector);
        let invoker = Arc::new(ScriptedInvoker::new());
        let service = Arc::new(ScoutService::new(
            &ScoutConfig::default(),
            Arc::new(credentials),
            connector.clone(),
            invoker.clone(),
        ));
        Fixture {
            service,
            connector,
            invoker,
        }
    }

    fn all_authenticated() -> InMemoryCredentialProvider {
        InMemoryCredentialProvider::new()
            .with_token(ServiceId::Notion, AccessToken::bearer("n"))
            .with_token(ServiceId::Atlassian, AccessToken::bearer("a"))
    }

    fn mixed_backends() -> FakeConnector {
        FakeConnector::new()
            .with_backend(ServiceId::Notion, FakeBackend::searchable(["foo"]))
            .with_backend(
                ServiceId::Atlassian,
                FakeBackend::resources_only(vec![ResourceInfo {
                    uri: "x".to_string(),
                    name: Some("doc1".to_string()),
                    description: None,
                }]),
            )
    }

    #[tokio::test]
    async fn search_merges_searchable_and_listing_backends() {
        let f = fixture(mixed_backends(), all_authenticated());

        let results = f
            .service
            .search("q", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let notion = results.iter().find(|r| r.source == ServiceId::Notion).unwrap();
        assert_eq!(notion.content, "foo");
        let atlassian = results
            .iter()
            .find(|r| r.source == ServiceId::Atlassian)
            .unwrap();
        assert_eq!(atlassian.title, "doc1");
        assert_eq!(atlassian.url.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn single_service_search_propagates_failure() {
        let f = fixture(mixed_backends(), InMemoryCredentialProvider::new());

        let err = f
            .service
            .search_service(ServiceId::Notion, "q")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated { service: ServiceId::Notion }));
    }

    #[tokio::test]
    async fn status_reflects_credentials_and_sessions() {
        let credentials =
            InMemoryCredentialProvider::new().with_token(ServiceId::Notion, AccessToken::bearer("n"));
        let f = fixture(mixed_backends(), credentials);

        f.service.initialize_service(ServiceId::Notion).await.unwrap();
        let status = f.service.oauth_status().await;

        assert_eq!(
            status,
            vec![
                ServiceStatus {
                    service: ServiceId::Notion,
                    connected: true,
                    needs_auth: false
                },
                ServiceStatus {
                    service: ServiceId::Atlassian,
                    connected: false,
                    needs_auth: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn initialize_all_is_independent_per_service() {
        let connector = mixed_backends().refusing(ServiceId::Atlassian, "down");
        let f = fixture(connector, all_authenticated());

        let outcomes = f.service.initialize_all(&CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].1.is_ok());
        assert!(matches!(
            outcomes[1].1,
            Err(Error::Connection { service: ServiceId::Atlassian, .. })
        ));

        assert!(f.service.disconnect_all().await.is_empty());
        assert!(f.connector.sessions(ServiceId::Notion)[0].is_closed());
        f.service.disconnect(ServiceId::Notion).await.unwrap();
    }

    #[tokio::test]
    async fn chat_through_aggregate_tool() {
        let f = fixture(mixed_backends(), all_authenticated());
        f.invoker.push_reply(ModelReply::tool_use(
            "",
            vec![ToolCallRequest {
                id: "toolu_1".to_string(),
                name: "searchAll".to_string(),
                input: json!({"query": "design doc"}),
            }],
        ));
        f.invoker.push_final("Found foo and doc1.");

        let response = f
            .service
            .chat("find the design doc", None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.response, "Found foo and doc1.");
        assert_eq!(response.tools_used, vec!["searchAll"]);
        assert_eq!(response.search_results.as_ref().map(Vec::len), Some(2));

        let continuation = &f.invoker.continuations()[0];
        let payload = continuation.tool_results[0].payload.as_ref().unwrap();
        assert_eq!(payload.as_array().map(Vec::len), Some(2));

        let conversation = f
            .service
            .get_conversation(response.conversation_id)
            .await
            .unwrap();
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn turns_on_one_conversation_are_serialized() {
        let f = fixture(
            mixed_backends().with_connect_delay(Duration::from_millis(20)),
            all_authenticated(),
        );
        let id = f.service.create_conversation().await;
        for n in 0..2 {
            f.invoker.push_reply(ModelReply::tool_use(
                "",
                vec![ToolCallRequest {
                    id: format!("call_{n}"),
                    name: "searchNotion".to_string(),
                    input: json!({"query": "q"}),
                }],
            ));
            f.invoker.push_final(format!("answer {n}"));
        }

        let (a, b) = tokio::join!(
            f.service.chat("first", Some(id), CancellationToken::new()),
            f.service.chat("second", Some(id), CancellationToken::new())
        );
        a.unwrap();
        b.unwrap();

        let conversation = f.service.get_conversation(id).await.unwrap();
        let roles: Vec<_> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(f.connector.connect_count(ServiceId::Notion), 1);
    }

    #[tokio::test]
    async fn conversation_lifecycle() {
        let f = fixture(FakeConnector::new(), all_authenticated());
        f.invoker.push_reply(ModelReply::text("a"));
        f.invoker.push_reply(ModelReply::text("b"));
        f.invoker.push_reply(ModelReply::text("c"));

        let first = f
            .service
            .chat("one", None, CancellationToken::new())
            .await
            .unwrap()
            .conversation_id;
        f.service
            .chat("two", Some(first), CancellationToken::new())
            .await
            .unwrap();
        f.service
            .chat("three", None, CancellationToken::new())
            .await
            .unwrap();

        let stats = f.service.stats().await;
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_messages, 6);
        assert_eq!(stats.average_messages_per_conversation, 3.0);
        assert_eq!(f.service.list_conversations().await.len(), 2);

        f.service.clear_conversation(first).await.unwrap();
        assert!(matches!(
            f.service.clear_conversation(first).await,
            Err(Error::ConversationNotFound(_))
        ));
        assert!(matches!(
            f.service.get_conversation(first).await,
            Err(Error::ConversationNotFound(_))
        ));

        f.service.clear_all_conversations().await;
        assert_eq!(f.service.stats().await.total_conversations, 0);
    }

    #[tokio::test]
    async fn configured_system_prompt_is_used() {
        let connector = Arc::new(FakeConnector::new());
        let invoker = Arc::new(ScriptedInvoker::new());
        let config = ScoutConfig {
            system_prompt: Some("Answer in French.".to_string()),
            ..ScoutConfig::default()
        };
        let service = ScoutService::new(
            &config,
            Arc::new(all_authenticated()),
            connector,
            invoker.clone(),
        );

        assert_eq!(service.system_prompt().await, "Answer in French.");
        service.set_system_prompt("Answer in German.").await;
        service
            .chat("hi", None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(invoker.converse_requests()[0].system_prompt, "Answer in German.");
    }
}
