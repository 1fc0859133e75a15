//! Independent-failure fan-out.
//!
//! Every branch runs as its own task and settles on its own: a failing,
//! panicking or cancelled branch never takes its siblings down with it.
//! Callers receive one outcome per branch, in the order the branches were
//! given, once all of them have settled.

use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Why a branch settled without producing its own outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BranchFailure {
    #[error("cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Run all branches concurrently and wait for every one of them to settle.
pub async fn join_settled<K, T, E, F>(
    branches: impl IntoIterator<Item = (K, F)>,
    token: &CancellationToken,
) -> Vec<(K, Result<T, E>)>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<BranchFailure> + Send + 'static,
{
    let mut keys = Vec::new();
    let mut outcomes: Vec<Option<Result<T, E>>> = Vec::new();
    let mut index_of = HashMap::new();
    let mut tasks = JoinSet::new();

    for (index, (key, branch)) in branches.into_iter().enumerate() {
        keys.push(key);
        outcomes.push(None);

        let token = token.clone();
        let handle = tasks.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(E::from(BranchFailure::Cancelled)),
                outcome = branch => outcome,
            }
        });
        index_of.insert(handle.id(), index);
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(join_error) => {
                error!(target: "fanout", "Branch task failed: {}", join_error);
                let failure = if join_error.is_cancelled() {
                    BranchFailure::Cancelled
                } else {
                    BranchFailure::Panicked(join_error.to_string())
                };
                (join_error.id(), Err(E::from(failure)))
            }
        };

        match index_of.get(&id).and_then(|&index| outcomes.get_mut(index)) {
            Some(slot) => *slot = Some(outcome),
            None => warn!(target: "fanout", "Settled branch has no registered slot"),
        }
    }

    keys.into_iter()
        .zip(outcomes)
        .map(|(key, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                Err(E::from(BranchFailure::Panicked(
                    "branch never settled".to_string(),
                )))
            });
            (key, outcome)
        })
        .collect()
}
