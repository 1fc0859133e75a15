//! Executes the tool calls of one model turn.

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use super::tools::SearchTool;
use crate::api::{ToolCallRequest, ToolCallResult};
use crate::error::{Error, Result};
use crate::search::{SearchAggregator, SearchResult};
use crate::utils::join_settled;

/// Everything the tool phase of a turn produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One per request, in request order.
    pub results: Vec<ToolCallResult>,
    /// Names of recognized tools that were dispatched, deduplicated.
    pub tools_used: Vec<String>,
    /// Search results from successful calls.
    pub search_results: Vec<SearchResult>,
}

#[derive(Clone)]
pub struct ToolDispatcher {
    aggregator: Arc<SearchAggregator>,
}

impl ToolDispatcher {
    pub fn new(aggregator: Arc<SearchAggregator>) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &Arc<SearchAggregator> {
        &self.aggregator
    }

    /// Run every call concurrently. Each request yields exactly one result,
    /// whether it succeeded, failed or was cancelled.
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCallRequest],
        token: &CancellationToken,
    ) -> DispatchOutcome {
        let services = self.aggregator.services().to_vec();
        let mut tools_used: Vec<String> = Vec::new();
        for call in calls {
            if SearchTool::parse(&call.name, &services).is_some()
                && !tools_used.contains(&call.name)
            {
                tools_used.push(call.name.clone());
            }
        }

        let branches = calls.iter().cloned().map(|call| {
            let dispatcher = self.clone();
            let token = token.clone();
            let id = call.id.clone();
            (id, async move { dispatcher.dispatch(call, token).await })
        });

        let mut results = Vec::with_capacity(calls.len());
        let mut search_results = Vec::new();
        for (id, outcome) in join_settled(branches, token).await {
            match outcome.and_then(|found| to_payload(&found).map(|payload| (found, payload))) {
                Ok((found, payload)) => {
                    search_results.extend(found);
                    results.push(ToolCallResult::success(id, payload));
                }
                Err(e) => {
                    error!(target: "app::dispatch", tool_id = %id, "Tool call failed: {}", e);
                    results.push(ToolCallResult::failure(id, e.to_string()));
                }
            }
        }

        DispatchOutcome {
            results,
            tools_used,
            search_results,
        }
    }

    #[instrument(skip(self, call, token), fields(tool.name = %call.name, tool.id = %call.id))]
    async fn dispatch(
        &self,
        call: ToolCallRequest,
        token: CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let services = self.aggregator.services();
        let tool = SearchTool::parse(&call.name, services)
            .ok_or_else(|| Error::validation(format!("Unknown tool: {}", call.name)))?;
        let query = query_argument(&call.input)?;

        debug!(target: "app::dispatch", "Dispatching {} for '{}'", tool, query);
        match tool {
            SearchTool::Service(service) => self.aggregator.invoker().search(service, query).await,
            SearchTool::All => self.aggregator.search_all(query, &token).await,
        }
    }
}

fn query_argument(input: &Value) -> Result<&str> {
    input
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| Error::validation("Tool input requires a non-empty 'query' string"))
}

fn to_payload(results: &[SearchResult]) -> Result<Value> {
    serde_json::to_value(results)
        .map_err(|e| Error::Internal(format!("Failed to encode search results: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, InMemoryCredentialProvider};
    use crate::config::ServiceId;
    use crate::mcp::ConnectionManager;
    use crate::search::BackendInvoker;
    use crate::test_utils::{FakeBackend, FakeConnector};
    use serde_json::json;

    fn dispatcher(connector: FakeConnector) -> ToolDispatcher {
        let credentials = InMemoryCredentialProvider::new()
            .with_token(ServiceId::Notion, AccessToken::bearer("n"))
            .with_token(ServiceId::Atlassian, AccessToken::bearer("a"));
        let connections = Arc::new(ConnectionManager::new(
            ServiceId::all()
                .into_iter()
                .map(ServiceId::default_config)
                .collect(),
            Arc::new(credentials),
            Arc::new(connector),
        ));
        ToolDispatcher::new(Arc::new(SearchAggregator::new(
            Arc::new(BackendInvoker::new(connections)),
            ServiceId::all(),
        )))
    }

    fn call(id: &str, name: &str, input: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }

    #[tokio::test]
    async fn every_call_gets_exactly_one_result() {
        let dispatcher = dispatcher(
            FakeConnector::new()
                .with_backend(ServiceId::Notion, FakeBackend::searchable(["n1"]))
                .refusing(ServiceId::Atlassian, "down"),
        );
        let calls = vec![
            call("a", "searchNotion", json!({"query": "q"})),
            call("b", "searchAtlassian", json!({"query": "q"})),
            call("c", "searchJira", json!({"query": "q"})),
            call("d", "searchNotion", json!({})),
        ];

        let outcome = dispatcher
            .dispatch_all(&calls, &CancellationToken::new())
            .await;

        let ids: Vec<_> = outcome.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(!outcome.results[0].is_error());
        assert!(outcome.results[1].error.as_deref().unwrap().contains("atlassian"));
        assert!(outcome.results[2].error.as_deref().unwrap().contains("Unknown tool"));
        assert!(outcome.results[3].error.as_deref().unwrap().contains("query"));

        assert_eq!(outcome.tools_used, vec!["searchNotion", "searchAtlassian"]);
        assert_eq!(outcome.search_results.len(), 1);
        assert_eq!(outcome.search_results[0].content, "n1");
    }

    #[tokio::test]
    async fn cancelled_calls_still_produce_results() {
        let dispatcher = dispatcher(
            FakeConnector::new().with_connect_delay(std::time::Duration::from_secs(30)),
        );
        let token = CancellationToken::new();
        token.cancel();

        let outcome = dispatcher
            .dispatch_all(&[call("a", "searchAll", json!({"query": "q"}))], &token)
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].error.as_deref(), Some("Cancelled"));
    }
}
