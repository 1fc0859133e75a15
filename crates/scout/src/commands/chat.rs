use async_trait::async_trait;
use eyre::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::Command;
use scout_core::ScoutService;
use scout_core::app::{ChatResponse, ConversationId};

pub struct ChatCommand {
    pub service: Arc<ScoutService>,
    pub conversation: Option<ConversationId>,
    pub system_prompt: Option<String>,
    pub message: Option<String>,
    pub token: CancellationToken,
}

/// A line typed in interactive mode.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Exit,
    New,
    Stats,
    Prompt(Option<&'a str>),
    Help,
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));
    match name {
        "exit" | "quit" => Input::Exit,
        "new" | "clear" => Input::New,
        "stats" => Input::Stats,
        "prompt" => Input::Prompt(Some(rest).filter(|r| !r.is_empty())),
        "help" => Input::Help,
        _ => Input::Message(line),
    }
}

fn print_response(stdout: &mut impl Write, response: &ChatResponse) -> std::io::Result<()> {
    writeln!(stdout, "{}", response.response)?;
    if !response.tools_used.is_empty() {
        let found = response.search_results.as_ref().map_or(0, Vec::len);
        writeln!(
            stdout,
            "\n(searched with {}; {} result(s))",
            response.tools_used.join(", "),
            found
        )?;
    }
    Ok(())
}

#[async_trait]
impl Command for ChatCommand {
    async fn execute(&self) -> Result<()> {
        if let Some(prompt) = &self.system_prompt {
            self.service.set_system_prompt(prompt.clone()).await;
        }

        match &self.message {
            Some(message) => {
                let response = self
                    .service
                    .chat(message, self.conversation, self.token.clone())
                    .await?;
                let mut stdout = std::io::stdout();
                print_response(&mut stdout, &response)?;
                writeln!(stdout, "\nconversation: {}", response.conversation_id)?;
                Ok(())
            }
            None => self.interactive().await,
        }
    }
}

impl ChatCommand {
    async fn interactive(&self) -> Result<()> {
        let mut conversation = match self.conversation {
            Some(id) => {
                self.service.get_conversation(id).await?;
                id
            }
            None => self.service.create_conversation().await,
        };

        let mut stdout = std::io::stdout();
        writeln!(stdout, "Conversation {conversation}. Type /help for commands.")?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            write!(stdout, "> ")?;
            stdout.flush()?;

            let line = tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };

            match parse_input(&line) {
                Input::Empty => {}
                Input::Exit => break,
                Input::Help => {
                    writeln!(stdout, "/new      start a new conversation")?;
                    writeln!(stdout, "/stats    show conversation statistics")?;
                    writeln!(stdout, "/prompt   show or set the system prompt")?;
                    writeln!(stdout, "/exit     quit")?;
                }
                Input::New => {
                    conversation = self.service.create_conversation().await;
                    writeln!(stdout, "Conversation {conversation}.")?;
                }
                Input::Stats => {
                    let stats = self.service.stats().await;
                    writeln!(
                        stdout,
                        "{} conversation(s), {} message(s), {:.2} per conversation",
                        stats.total_conversations,
                        stats.total_messages,
                        stats.average_messages_per_conversation
                    )?;
                }
                Input::Prompt(None) => {
                    writeln!(stdout, "{}", self.service.system_prompt().await)?;
                }
                Input::Prompt(Some(prompt)) => {
                    self.service.set_system_prompt(prompt).await;
                    writeln!(stdout, "System prompt updated.")?;
                }
                Input::Message(message) => {
                    let turn = self
                        .service
                        .chat(message, Some(conversation), self.token.child_token())
                        .await;
                    match turn {
                        Ok(response) => print_response(&mut stdout, &response)?,
                        Err(e) => {
                            warn!(target: "scout::chat", "Chat turn failed: {}", e);
                            writeln!(stdout, "Error: {e}")?;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  hello there ", Input::Message("hello there"))]
    #[case("/exit", Input::Exit)]
    #[case("/quit", Input::Exit)]
    #[case("/new", Input::New)]
    #[case("/stats", Input::Stats)]
    #[case("/prompt", Input::Prompt(None))]
    #[case("/prompt  Be brief. ", Input::Prompt(Some("Be brief.")))]
    #[case("/unknown thing", Input::Message("/unknown thing"))]
    #[case("   ", Input::Empty)]
    fn parses_interactive_input(#[case] line: &str, #[case] expected: Input<'static>) {
        assert_eq!(parse_input(line), expected);
    }

    #[test]
    fn response_lists_tools_used() {
        let response = ChatResponse {
            response: "Answer.".to_string(),
            tools_used: vec!["searchAll".to_string()],
            search_results: Some(Vec::new()),
            conversation_id: ConversationId::new(),
        };
        let mut out = Vec::new();
        print_response(&mut out, &response).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Answer.\n\n(searched with searchAll; 0 result(s))\n"
        );
    }
}
