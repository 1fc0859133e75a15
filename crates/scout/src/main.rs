use clap::Parser;
use eyre::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scout::cli::{Cli, Commands};
use scout::commands::{
    Command, chat::ChatCommand, search::SearchCommand, status::StatusCommand,
};
use scout_core::config::ScoutConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre for better error reports
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load .env file if it exists
    scout::cli::config::load_env()?;

    scout_core::utils::tracing::init_tracing(&scout::cli::config::log_options(
        cli.debug,
        cli.log_stderr,
    ))?;

    let config = ScoutConfig::load(cli.config.as_deref())?;
    debug!(target: "scout", services = config.services.len(), "Loaded configuration");

    let service = Arc::new(scout::build_service(&config)?);

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!(target: "scout", "Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let command: Box<dyn Command> = match cli.command {
        Commands::Search {
            query,
            service: only,
            json,
        } => Box::new(SearchCommand {
            service: service.clone(),
            query: query.join(" "),
            only,
            json,
            token: token.clone(),
        }),
        Commands::Chat {
            conversation,
            system_prompt,
            message,
        } => Box::new(ChatCommand {
            service: service.clone(),
            conversation,
            system_prompt,
            message: (!message.is_empty()).then(|| message.join(" ")),
            token: token.clone(),
        }),
        Commands::Status { connect } => Box::new(StatusCommand {
            service: service.clone(),
            connect,
            token: token.clone(),
        }),
    };

    let outcome = command.execute().await;

    for (id, e) in service.disconnect_all().await {
        warn!(target: "scout", "Failed to disconnect from {}: {}", id, e);
    }

    outcome
}
