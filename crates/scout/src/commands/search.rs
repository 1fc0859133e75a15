use async_trait::async_trait;
use chrono::Local;
use eyre::Result;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Command;
use scout_core::ScoutService;
use scout_core::config::ServiceId;
use scout_core::search::SearchResult;

const SNIPPET_CHARS: usize = 200;

pub struct SearchCommand {
    pub service: Arc<ScoutService>,
    pub query: String,
    pub only: Option<ServiceId>,
    pub json: bool,
    pub token: CancellationToken,
}

#[async_trait]
impl Command for SearchCommand {
    async fn execute(&self) -> Result<()> {
        let results = match self.only {
            Some(service) => self.service.search_service(service, &self.query).await?,
            None => self.service.search(&self.query, &self.token).await?,
        };

        let mut stdout = std::io::stdout();
        if self.json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&results)?)?;
        } else {
            render_results(&mut stdout, &results)?;
        }
        Ok(())
    }
}

pub fn render_results(out: &mut impl Write, results: &[SearchResult]) -> std::io::Result<()> {
    if results.is_empty() {
        writeln!(out, "No results found.")?;
        return Ok(());
    }

    for (index, result) in results.iter().enumerate() {
        writeln!(out, "{:>2}. [{}] {}", index + 1, result.source, result.title)?;
        if let Some(url) = &result.url {
            writeln!(out, "    {url}")?;
        }
        if let Some(modified) = result.last_modified {
            writeln!(
                out,
                "    {}",
                modified.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        let snippet = snippet(&result.content);
        if !snippet.is_empty() {
            writeln!(out, "    {snippet}")?;
        }
    }
    Ok(())
}

fn snippet(content: &str) -> String {
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= SNIPPET_CHARS {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}
