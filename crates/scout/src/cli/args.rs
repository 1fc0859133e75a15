use clap::{Parser, Subcommand};
use scout_core::app::ConversationId;
use scout_core::config::ServiceId;
use std::path::PathBuf;

/// Search your team's knowledge sources, directly or through an assistant.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Path to a configuration file (defaults to ./.scout/config.toml, then the user config dir)
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging when RUST_LOG is not set
    #[arg(long, global = true)]
    pub debug: bool,

    /// Write logs to stderr instead of the log directory
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Search every configured service and print merged results
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Search only this service
        #[arg(long)]
        service: Option<ServiceId>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a question; the assistant decides which services to search
    Chat {
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<ConversationId>,

        /// Override the system prompt for this run
        #[arg(long)]
        system_prompt: Option<String>,

        /// Message to send. Starts an interactive session when omitted.
        message: Vec<String>,
    },
    /// Show connection and authorization state for each service
    Status {
        /// Connect to every service before reporting
        #[arg(long)]
        connect: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_service_filter() {
        let cli = Cli::parse_from(["scout", "search", "--service", "Notion", "q3", "roadmap"]);
        match cli.command {
            Commands::Search {
                query,
                service,
                json,
            } => {
                assert_eq!(query, vec!["q3", "roadmap"]);
                assert_eq!(service, Some(ServiceId::Notion));
                assert!(!json);
            }
            _ => unreachable!("expected search"),
        }
    }

    #[test]
    fn chat_message_is_optional() {
        let cli = Cli::parse_from(["scout", "--debug", "chat"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Chat { message, .. } if message.is_empty()));
    }

    #[test]
    fn rejects_malformed_conversation_id() {
        assert!(Cli::try_parse_from(["scout", "chat", "--conversation", "nope", "hi"]).is_err());
    }
}
