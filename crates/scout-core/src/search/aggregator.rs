use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::invoker::BackendInvoker;
use super::result::{SearchResult, deduplicate, sort_results};
use crate::config::ServiceId;
use crate::error::{Error, Result};
use crate::utils::join_settled;

/// Merged outcome of a fan-out, with the backends that failed.
#[derive(Debug, Default)]
pub struct AggregateSearch {
    pub results: Vec<SearchResult>,
    pub failed: Vec<(ServiceId, Error)>,
}

/// Fans a query out to every configured backend at once.
pub struct SearchAggregator {
    invoker: Arc<BackendInvoker>,
    services: Vec<ServiceId>,
}

impl SearchAggregator {
    /// `services` order is the precedence used to break ranking ties.
    pub fn new(invoker: Arc<BackendInvoker>, services: Vec<ServiceId>) -> Self {
        Self { invoker, services }
    }

    pub fn invoker(&self) -> &Arc<BackendInvoker> {
        &self.invoker
    }

    pub fn services(&self) -> &[ServiceId] {
        &self.services
    }

    /// Merged, deduplicated and ranked results from every backend that
    /// answered. Backend failures are logged, never returned.
    pub async fn search_all(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.search_all_detailed(query, token).await?.results)
    }

    #[instrument(skip(self, token))]
    pub async fn search_all_detailed(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<AggregateSearch> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("Query cannot be empty"));
        }
        if self.services.is_empty() {
            return Err(Error::AggregateUnavailable(
                "no backends are configured".to_string(),
            ));
        }

        let branches = self.services.iter().map(|&service| {
            let invoker = self.invoker.clone();
            let query = query.to_string();
            (service, async move { invoker.search(service, &query).await })
        });

        let mut merged = Vec::new();
        let mut failed = Vec::new();
        for (service, outcome) in join_settled(branches, token).await {
            match outcome {
                Ok(results) => merged.extend(results),
                Err(e) => {
                    warn!(target: "search::aggregator", service = %service, "Backend search failed: {}", e);
                    failed.push((service, e));
                }
            }
        }

        let mut results = deduplicate(merged);
        sort_results(&mut results, &self.services);

        info!(
            target: "search::aggregator",
            results = results.len(),
            failed = failed.len(),
            "Aggregate search settled"
        );

        Ok(AggregateSearch { results, failed })
    }
}
