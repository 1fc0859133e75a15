use async_trait::async_trait;
use eyre::Result;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Command;
use scout_core::ScoutService;
use scout_core::config::ServiceConfig;

pub struct StatusCommand {
    pub service: Arc<ScoutService>,
    pub connect: bool,
    pub token: CancellationToken,
}

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();

        if self.connect {
            for (service, outcome) in self.service.initialize_all(&self.token).await {
                if let Err(e) = outcome {
                    writeln!(stdout, "{service}: {e}")?;
                }
            }
        }

        writeln!(stdout, "{:<12} {:<10} {:<10}", "Service", "Connected", "Auth")?;
        writeln!(stdout, "{}", "-".repeat(34))?;
        let statuses = self.service.oauth_status().await;
        for status in &statuses {
            let auth = if status.needs_auth {
                "missing"
            } else {
                "ok"
            };
            writeln!(
                stdout,
                "{:<12} {:<10} {:<10}",
                status.service.to_string(),
                if status.connected { "yes" } else { "no" },
                auth
            )?;
        }

        for status in statuses.iter().filter(|status| status.needs_auth) {
            if let Some(config) = self.service.service_config(status.service) {
                writeln!(stdout, "{}", auth_hint(config))?;
            }
        }

        Ok(())
    }
}

fn auth_hint(config: &ServiceConfig) -> String {
    let mut hint = format!("{}: set {}", config.id, config.token_env());
    if !config.scope.is_empty() {
        hint.push_str(&format!(" to a token granted '{}'", config.scope));
    }
    hint
}
