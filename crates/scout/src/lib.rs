pub mod claude;
pub mod cli;
pub mod commands;

pub use scout_core::{api, app, auth, config, mcp, search, utils};

use eyre::Result;
use std::sync::Arc;

use claude::ClaudeInvoker;
use scout_core::ScoutService;
use scout_core::auth::EnvCredentialProvider;
use scout_core::config::ScoutConfig;
use scout_core::mcp::RmcpConnector;

/// Wires the production collaborators: bearer tokens from the environment,
/// streamable HTTP sessions and the Claude messages API.
pub fn build_service(config: &ScoutConfig) -> Result<ScoutService> {
    let credentials = Arc::new(EnvCredentialProvider::from_services(&config.services));
    let connector = Arc::new(RmcpConnector::new(&config.timeouts));
    let invoker = Arc::new(
        ClaudeInvoker::from_env(&config.model)
            .map_err(|e| eyre::eyre!("Failed to create model client: {}", e))?,
    );

    Ok(ScoutService::new(config, credentials, connector, invoker))
}
