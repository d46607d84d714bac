//! Slash command parsing for the chat application.
//!
//! This module handles the commands that control the terminal session itself
//! (sessions, model, attachments) without producing a message. The in-chat
//! commands `/clear`, `/cari`, `/web`, and `/kalkulator` are submitted as
//! messages and classified by [`route`](super::route) instead.

/// Commands that are submitted as messages rather than handled by the REPL.
const MESSAGE_COMMANDS: &[&str] = &["clear", "cari", "web", "kalkulator"];

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Start a fresh conversation.
    New,

    /// List sessions, most recent first.
    Chats,

    /// Switch to the session at this 1-based position in the list.
    Open(usize),

    /// Rename the active session.
    Rename(String),

    /// Delete the session at this position, or the active one.
    Delete(Option<usize>),

    /// Send an image with an optional prompt.
    Image {
        /// Path to the image file.
        path: String,
        /// Prompt text; empty asks for a description.
        prompt: String,
    },

    /// Change the model.
    Model(String),

    /// Save all sessions to a file immediately.
    SaveTranscript(String),

    /// Load sessions from a file.
    LoadTranscript(String),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for REPL commands.
///
/// Returns `Some(ChatCommand)` if the input is a REPL command, or `None` if it
/// should be submitted as a message.
///
/// # Examples
///
/// ```
/// # use fireflies::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/open 2").is_some());
/// assert!(parse_command("/cari berita hari ini").is_none());
/// assert!(parse_command("Halo!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    if MESSAGE_COMMANDS.contains(&command.as_str()) {
        return None;
    }

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "chats" | "sessions" => ChatCommand::Chats,
        "open" => match argument.map(parse_position) {
            Some(Ok(position)) => ChatCommand::Open(position),
            Some(Err(err)) => ChatCommand::Invalid(format!("/open {err}")),
            None => ChatCommand::Invalid("/open requires a chat number".to_string()),
        },
        "rename" => match argument {
            Some(title) => ChatCommand::Rename(title.to_string()),
            None => ChatCommand::Invalid("/rename requires a title".to_string()),
        },
        "delete" => match argument.map(parse_position) {
            Some(Ok(position)) => ChatCommand::Delete(Some(position)),
            Some(Err(err)) => ChatCommand::Invalid(format!("/delete {err}")),
            None => ChatCommand::Delete(None),
        },
        "image" => match argument {
            Some(arg) => {
                let mut parts = arg.splitn(2, char::is_whitespace);
                let path = parts.next().unwrap_or_default().to_string();
                let prompt = parts.next().map(|s| s.trim()).unwrap_or_default();
                ChatCommand::Image {
                    path,
                    prompt: prompt.to_string(),
                }
            }
            None => ChatCommand::Invalid("/image requires a file path".to_string()),
        },
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "save" => match argument {
            Some(arg) => ChatCommand::SaveTranscript(arg.to_string()),
            None => ChatCommand::Invalid("/save requires a file path".to_string()),
        },
        "load" => match argument {
            Some(arg) => ChatCommand::LoadTranscript(arg.to_string()),
            None => ChatCommand::Invalid("/load requires a file path".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_position(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err("expects a chat number from /chats".to_string()),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /cari <query>              Search the web and answer from the results
  /web <question> <url>      Answer a question about a web page
  /kalkulator <expression>   Evaluate arithmetic (e.g., /kalkulator 2 + 2 * 5)
  /clear                     Reset the model's conversation memory
  /image <file> [prompt]     Ask about an image (png, jpg, gif, webp)
  /new                       Start a new chat
  /chats                     List chats
  /open <n>                  Switch to chat n from /chats
  /rename <title>            Rename the current chat
  /delete [n]                Delete chat n, or the current chat
  /model <name>              Change the model (e.g., /model llama3.2:3b)
  /save <file>               Save all chats to a file
  /load <file>               Load chats from a file
  /stats                     Show statistics
  /config                    Show current configuration
  /help                      Show this help message
  /quit                      Exit the chat

Press Ctrl+C while a response is streaming to stop it."#
}
