use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::result::SearchResult;
use super::selector::{CapabilitySelector, KeywordSelector};
use crate::config::ServiceId;
use crate::error::{Error, Result};
use crate::mcp::{ConnectionManager, ContentChunk, McpError, SessionLease};

/// Most resources mapped into results when a backend cannot search.
pub const RESOURCE_FALLBACK_LIMIT: usize = 5;

/// Runs a query against one backend and normalizes what comes back.
pub struct BackendInvoker {
    connections: Arc<ConnectionManager>,
    selector: Arc<dyn CapabilitySelector>,
}

impl BackendInvoker {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self::with_selector(connections, Arc::new(KeywordSelector::default()))
    }

    pub fn with_selector(
        connections: Arc<ConnectionManager>,
        selector: Arc<dyn CapabilitySelector>,
    ) -> Self {
        Self {
            connections,
            selector,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Search one backend. Every failure is tagged with the service.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn search(&self, service: ServiceId, query: &str) -> Result<Vec<SearchResult>> {
        self.run(service, query)
            .await
            .map_err(|e| Error::backend(service, e))
    }

    async fn run(
        &self,
        service: ServiceId,
        query: &str,
    ) -> std::result::Result<Vec<SearchResult>, McpError> {
        let session = self.connections.acquire(service).await?;
        let capabilities = session.list_capabilities().await?;

        match self.selector.select(&capabilities) {
            Some(capability) => {
                debug!(target: "search::invoker", "Using capability '{}'", capability.name);
                search_with(&session, &capability.name, query).await
            }
            None => {
                debug!(target: "search::invoker", "No search capability, listing resources");
                list_fallback(&session).await
            }
        }
    }
}

async fn search_with(
    session: &SessionLease,
    capability: &str,
    query: &str,
) -> std::result::Result<Vec<SearchResult>, McpError> {
    let service = session.service();
    let mut arguments = Map::new();
    arguments.insert("query".to_string(), Value::String(query.to_string()));

    let output = session.invoke_capability(capability, arguments).await?;
    if output.is_error {
        return Err(McpError::InvocationFailed {
            name: capability.to_string(),
            message: output.text(),
        });
    }

    let invoked_at = Utc::now();
    Ok(output
        .content
        .into_iter()
        .filter_map(|chunk| match chunk {
            ContentChunk::Text(text) => Some(SearchResult {
                id: result_id(service),
                title: format!("Result from {}", service.display_name()),
                content: text,
                source: service,
                url: None,
                last_modified: Some(invoked_at),
            }),
            ContentChunk::Other => None,
        })
        .collect())
}

async fn list_fallback(session: &SessionLease) -> std::result::Result<Vec<SearchResult>, McpError> {
    let service = session.service();
    let resources = session.list_resources().await?;

    Ok(resources
        .into_iter()
        .take(RESOURCE_FALLBACK_LIMIT)
        .map(|resource| SearchResult {
            id: result_id(service),
            title: resource.name.unwrap_or_else(|| resource.uri.clone()),
            content: resource.description.unwrap_or_default(),
            source: service,
            url: Some(resource.uri),
            last_modified: None,
        })
        .collect())
}

fn result_id(service: ServiceId) -> String {
    format!("{service}-{}", Uuid::new_v4())
}
