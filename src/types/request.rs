use serde::{Deserialize, Serialize};

use crate::types::{Message, Role};

/// Model used whenever an image is attached, regardless of the selected model.
pub const VISION_MODEL: &str = "gemma3:4b";

/// The mode the backend should run a request in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Multi-turn chat with history attached.
    Chat,
    /// Direct prompt without history, used for vision requests.
    Generate,
    /// Reset the backend's conversation context.
    Clear,
    /// Fetch and extract the text of a web page.
    Web,
}

/// One prior turn of conversation sent to the backend for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of a request to the inference backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// The prompt text.
    pub prompt: String,

    /// Target model identifier.
    pub model: String,

    /// Attached image as a `data:` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Prior conversation for chat mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryTurn>>,

    /// Page to read for the `web` action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request mode. When absent the backend answers the prompt directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

impl InferenceRequest {
    /// Creates a bare prompt request for `model`.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            image: None,
            history: None,
            url: None,
            action: None,
        }
    }

    /// Creates a chat-mode request carrying `history`.
    pub fn chat(
        prompt: impl Into<String>,
        model: impl Into<String>,
        history: Vec<HistoryTurn>,
    ) -> Self {
        Self::new(prompt, model)
            .with_action(Action::Chat)
            .with_history(history)
    }

    /// Creates a direct-prompt vision request.
    ///
    /// The model is always [`VISION_MODEL`] and no history is attached.
    pub fn vision(prompt: impl Into<String>, image_data_url: impl Into<String>) -> Self {
        Self::new(prompt, VISION_MODEL)
            .with_action(Action::Generate)
            .with_image(image_data_url)
    }

    /// Creates a context-reset request.
    pub fn clear(model: impl Into<String>) -> Self {
        Self::new("/clear", model).with_action(Action::Clear)
    }

    /// Creates a page-extraction request for `url`.
    pub fn web(
        question: impl Into<String>,
        url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let mut request = Self::new(question, model).with_action(Action::Web);
        request.url = Some(url.into());
        request
    }

    /// Sets the request mode.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Attaches prior conversation.
    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = Some(history);
        self
    }

    /// Attaches an image `data:` URL.
    pub fn with_image(mut self, image_data_url: impl Into<String>) -> Self {
        self.image = Some(image_data_url.into());
        self
    }
}

/// Body of a single-shot backend reply.
///
/// Depending on the action the text arrives as `response` or `content`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceReply {
    /// Model answer for prompt requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Extracted text for the `web` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl InferenceReply {
    /// Returns the reply text, preferring `response` over `content`, ignoring blanks.
    pub fn text(&self) -> Option<&str> {
        self.response
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.content.as_deref().filter(|s| !s.trim().is_empty()))
    }
}
