//! Per-service session ownership.
//!
//! Each configured service has its own slot guarded by its own lock, so
//! unrelated services never contend. A slot is idle, has exactly one
//! connection attempt in flight, or holds exactly one live session.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::{McpError, McpSession, SessionConnector, SessionLease};
use crate::auth::CredentialProvider;
use crate::config::{ServiceConfig, ServiceId};

type AttemptFuture = Shared<BoxFuture<'static, Result<Arc<dyn McpSession>, McpError>>>;

enum SlotState {
    Idle,
    Pending { attempt: u64, future: AttemptFuture },
    Live(Arc<dyn McpSession>),
}

struct ServiceSlot {
    config: ServiceConfig,
    state: Mutex<SlotState>,
    next_attempt: AtomicU64,
}

impl ServiceSlot {
    /// Move a settled attempt into its final state, unless the slot has
    /// already moved on.
    async fn settle(&self, attempt: u64, outcome: &Result<Arc<dyn McpSession>, McpError>) {
        let mut state = self.state.lock().await;
        if matches!(&*state, SlotState::Pending { attempt: current, .. } if *current == attempt) {
            *state = match outcome {
                Ok(session) => SlotState::Live(session.clone()),
                Err(_) => SlotState::Idle,
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub needs_auth: bool,
}

impl ConnectionStatus {
    pub const CONNECTED: Self = Self {
        connected: true,
        needs_auth: false,
    };
    pub const DISCONNECTED: Self = Self {
        connected: false,
        needs_auth: false,
    };
    pub const NEEDS_AUTH: Self = Self {
        connected: false,
        needs_auth: true,
    };
}

pub struct ConnectionManager {
    slots: HashMap<ServiceId, Arc<ServiceSlot>>,
    order: Vec<ServiceId>,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn SessionConnector>,
}

impl ConnectionManager {
    pub fn new(
        services: Vec<ServiceConfig>,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for config in services {
            let id = config.id;
            if slots.contains_key(&id) {
                warn!(target: "mcp::manager", service = %id, "Ignoring duplicate service config");
                continue;
            }
            order.push(id);
            slots.insert(
                id,
                Arc::new(ServiceSlot {
                    config,
                    state: Mutex::new(SlotState::Idle),
                    next_attempt: AtomicU64::new(0),
                }),
            );
        }

        Self {
            slots,
            order,
            credentials,
            connector,
        }
    }

    /// Configured services, in configuration order.
    pub fn services(&self) -> &[ServiceId] {
        &self.order
    }

    pub fn config(&self, service: ServiceId) -> Option<&ServiceConfig> {
        self.slots.get(&service).map(|slot| &slot.config)
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    fn slot(&self, service: ServiceId) -> Result<&Arc<ServiceSlot>, McpError> {
        self.slots
            .get(&service)
            .ok_or(McpError::UnknownService { service })
    }

    /// Return the live session for `service`, connecting if needed.
    ///
    /// Concurrent callers for the same service share a single connection
    /// attempt and all observe its outcome.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn acquire(&self, service: ServiceId) -> Result<SessionLease, McpError> {
        let slot = self.slot(service)?;

        let pending = {
            let mut state = slot.state.lock().await;
            match &*state {
                SlotState::Live(session) => {
                    return Ok(SessionLease::new(service, session.clone()));
                }
                SlotState::Pending { future, .. } => {
                    debug!(target: "mcp::manager", "Joining in-flight connection attempt");
                    future.clone()
                }
                SlotState::Idle => {
                    let attempt = slot.next_attempt.fetch_add(1, Ordering::Relaxed);
                    let future = self.start_attempt(slot.clone(), attempt);
                    *state = SlotState::Pending {
                        attempt,
                        future: future.clone(),
                    };
                    future
                }
            }
        };

        pending
            .await
            .map(|session| SessionLease::new(service, session))
    }

    /// The attempt runs as its own task so the slot settles even when every
    /// waiter has gone away.
    fn start_attempt(&self, slot: Arc<ServiceSlot>, attempt: u64) -> AttemptFuture {
        let credentials = self.credentials.clone();
        let connector = self.connector.clone();
        let task_slot = slot.clone();

        let handle = tokio::spawn(async move {
            let outcome = open_session(
                &task_slot.config,
                credentials.as_ref(),
                connector.as_ref(),
            )
            .await;
            task_slot.settle(attempt, &outcome).await;
            outcome
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(
                        target: "mcp::manager",
                        service = %slot.config.id,
                        "Connection task failed: {}", join_error
                    );
                    let outcome = Err(McpError::AttemptAbandoned {
                        service: slot.config.id,
                        message: join_error.to_string(),
                    });
                    slot.settle(attempt, &outcome).await;
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Check whether `service` is usable without forcing a connection.
    ///
    /// A live session that fails the liveness probe is evicted so the next
    /// [`acquire`](Self::acquire) reconnects.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn probe(&self, service: ServiceId) -> Result<ConnectionStatus, McpError> {
        let slot = self.slot(service)?;

        if !self.credentials.is_authenticated(service).await {
            return Ok(ConnectionStatus::NEEDS_AUTH);
        }

        let session = match &*slot.state.lock().await {
            SlotState::Live(session) => session.clone(),
            SlotState::Idle | SlotState::Pending { .. } => {
                return Ok(ConnectionStatus::DISCONNECTED);
            }
        };

        match session.list_capabilities().await {
            Ok(_) => Ok(ConnectionStatus::CONNECTED),
            Err(e) => {
                warn!(target: "mcp::manager", "Liveness probe failed, evicting session: {}", e);
                evict(slot, &session).await;
                Ok(ConnectionStatus::DISCONNECTED)
            }
        }
    }

    pub async fn is_connected(&self, service: ServiceId) -> bool {
        match self.slot(service) {
            Ok(slot) => matches!(&*slot.state.lock().await, SlotState::Live(_)),
            Err(_) => false,
        }
    }

    /// Close and forget the live session for `service`, if any.
    ///
    /// An attempt still in flight is left alone.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn release(&self, service: ServiceId) -> Result<(), McpError> {
        let slot = self.slot(service)?;

        let session = {
            let mut state = slot.state.lock().await;
            match std::mem::replace(&mut *state, SlotState::Idle) {
                SlotState::Live(session) => Some(session),
                other => {
                    *state = other;
                    None
                }
            }
        };

        if let Some(session) = session {
            session.close().await?;
            info!(target: "mcp::manager", "Disconnected");
        }
        Ok(())
    }

    /// Release every service. One failure never stops the others; the
    /// failures are returned.
    pub async fn release_all(&self) -> Vec<(ServiceId, McpError)> {
        let releases = self.order.iter().map(|&service| async move {
            (service, self.release(service).await)
        });

        futures::future::join_all(releases)
            .await
            .into_iter()
            .filter_map(|(service, outcome)| match outcome {
                Ok(()) => None,
                Err(e) => {
                    warn!(target: "mcp::manager", service = %service, "Failed to disconnect: {}", e);
                    Some((service, e))
                }
            })
            .collect()
    }
}

async fn open_session(
    config: &ServiceConfig,
    credentials: &dyn CredentialProvider,
    connector: &dyn SessionConnector,
) -> Result<Arc<dyn McpSession>, McpError> {
    let service = config.id;
    let token = credentials
        .get_token(service)
        .await
        .map_err(|e| McpError::Credential {
            service,
            message: e.to_string(),
        })?
        .ok_or(McpError::NotAuthenticated { service })?;

    debug!(target: "mcp::manager", service = %service, "Opening session to {}", config.endpoint);
    let session = connector
        .connect(config, &token.authorization_header())
        .await?;
    info!(target: "mcp::manager", service = %service, "Connected");
    Ok(session)
}

/// Drop `session` from the slot if it is still the live one, then close it.
async fn evict(slot: &ServiceSlot, session: &Arc<dyn McpSession>) {
    {
        let mut state = slot.state.lock().await;
        if matches!(&*state, SlotState::Live(current) if Arc::ptr_eq(current, session)) {
            *state = SlotState::Idle;
        }
    }

    if let Err(e) = session.close().await {
        debug!(target: "mcp::manager", "Closing evicted session failed: {}", e);
    }
}
