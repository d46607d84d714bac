use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::Message;

/// Maximum number of characters of the first message used as a session title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Title given to sessions created by an explicit "new chat" action.
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Identifier of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A titled, ordered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique identifier.
    pub id: SessionId,

    /// Display title.
    pub title: String,

    /// Messages in display order.
    pub messages: Vec<Message>,

    /// When the session was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// When the session was last modified.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

impl ChatSession {
    /// Creates an empty session with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        let now = crate::utils::time::now();
        Self {
            id: SessionId::new(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the session as modified now.
    pub fn touch(&mut self) {
        self.updated_at = crate::utils::time::now();
    }
}

/// Derives a session title from the first message of a conversation.
///
/// Content longer than [`TITLE_MAX_CHARS`] characters is cut and suffixed with `...`.
pub fn title_from(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str("...");
        title
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_are_kept() {
        assert_eq!(title_from("Apa kabar?"), "Apa kabar?");
    }

    #[test]
    fn long_titles_are_truncated_on_char_boundaries() {
        let content = "é".repeat(60);
        let title = title_from(&content);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn exactly_fifty_is_not_truncated() {
        let content = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(title_from(&content), content);
    }

    #[test]
    fn new_session_is_empty() {
        let session = ChatSession::new(NEW_CHAT_TITLE);
        assert!(session.messages.is_empty());
        assert_eq!(session.title, "New Chat");
        assert_eq!(session.created_at, session.updated_at);
    }
}
