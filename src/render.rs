//! Output rendering for chat conversations.
//!
//! This module provides the [`ChatView`] trait the controller reports to and a
//! plain-text implementation for terminals.

use std::io::{self, Stdout, Write};

use crate::chat::GenerationState;
use crate::types::{Message, MessageId, Role};

/// ANSI escape code for dim text (used for the typing indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for presenting a conversation as it changes.
///
/// Updates carry the full current text of a message, never a delta, so a view
/// can always redraw from the latest snapshot.
pub trait ChatView: Send {
    /// Called when a message is added to the active session.
    fn message_appended(&mut self, message: &Message);

    /// Called with the full accumulated content of a message being streamed.
    fn message_updated(&mut self, id: MessageId, snapshot: &str);

    /// Called on every generation lifecycle transition.
    fn state_changed(&mut self, state: GenerationState) {
        _ = state;
    }

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);
}

/// Plain text view with optional ANSI styling.
///
/// Assistant messages are printed as they stream; user messages are not echoed
/// because the terminal already shows what was typed.
pub struct PlainTextView<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    current: Option<MessageId>,
    printed: String,
    typing: bool,
}

impl PlainTextView<Stdout> {
    /// Creates a new PlainTextView on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextView on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextView<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextView<W> {
    /// Creates a view that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            current: None,
            printed: String::new(),
            typing: false,
        }
    }

    /// Consumes the view and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn clear_typing(&mut self) {
        if self.typing {
            self.write("\r   \r");
            self.typing = false;
        }
    }

    fn finish_line(&mut self) {
        self.clear_typing();
        if self.current.take().is_some() && !self.printed.ends_with('\n') {
            self.write("\n");
        }
        self.printed.clear();
    }
}

impl<W: Write + Send> ChatView for PlainTextView<W> {
    fn message_appended(&mut self, message: &Message) {
        if message.role == Role::User {
            return;
        }
        self.finish_line();
        self.current = Some(message.id);
        self.printed = message.content.clone();
        let content = message.content.clone();
        self.write(&content);
    }

    fn message_updated(&mut self, id: MessageId, snapshot: &str) {
        self.clear_typing();
        if self.current != Some(id) {
            self.finish_line();
            self.current = Some(id);
        }
        match snapshot.strip_prefix(self.printed.as_str()) {
            Some(delta) => {
                let delta = delta.to_string();
                self.write(&delta);
            }
            None => {
                self.write("\n");
                self.write(snapshot);
            }
        }
        self.printed = snapshot.to_string();
    }

    fn state_changed(&mut self, state: GenerationState) {
        match state {
            GenerationState::AwaitingFirstToken => {
                if self.use_color {
                    self.write(&format!("{ANSI_DIM}...{ANSI_RESET}"));
                } else {
                    self.write("...");
                }
                self.typing = true;
            }
            GenerationState::Idle => self.finish_line(),
            _ => self.clear_typing(),
        }
    }

    fn print_info(&mut self, info: &str) {
        self.finish_line();
        self.write(&format!("{info}\n"));
    }

    fn print_error(&mut self, error: &str) {
        self.finish_line();
        if self.use_color {
            self.write(&format!("{ANSI_RED}Error: {error}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("Error: {error}\n"));
        }
    }
}
