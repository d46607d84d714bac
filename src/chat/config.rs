//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::DEFAULT_BACKEND_URL;
use crate::retrieval::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_RESULTS, DEFAULT_PROXY_URL, DEFAULT_SEARCH_TIMEOUT,
};

/// Model used for chat when none is selected.
pub const DEFAULT_MODEL: &str = "llama3.2:3b";

/// Default number of prior messages sent as backend context.
const DEFAULT_HISTORY_TURNS: usize = 20;

/// Default number of search results fetched for `/cari`.
const DEFAULT_SEARCH_FAN_OUT: usize = 1;

/// Command-line arguments for the fireflies-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: llama3.2:3b)", "MODEL")]
    pub model: Option<String>,

    /// Inference backend endpoint.
    #[arrrg(optional, "Backend URL (default: $FIREFLIES_BACKEND_URL or local)", "URL")]
    pub backend_url: Option<String>,

    /// Retrieval proxy endpoint.
    #[arrrg(optional, "Retrieval proxy URL", "URL")]
    pub proxy_url: Option<String>,

    /// Number of search results to read for /cari.
    #[arrrg(optional, "Search results to download for /cari (default: 1)", "N")]
    pub search_fan_out: Option<usize>,

    /// Number of prior messages sent as context.
    #[arrrg(optional, "Prior messages sent as context (default: 20)", "N")]
    pub history_turns: Option<usize>,

    /// Transcript file to load and auto-save.
    #[arrrg(optional, "Load and auto-save sessions to this JSON file", "FILE")]
    pub transcript: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat controller.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments and the environment with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The model used for chat requests.
    pub model: String,

    /// Inference backend endpoint.
    pub backend_url: String,

    /// Retrieval proxy endpoint.
    pub proxy_url: String,

    /// Maximum number of search results kept.
    pub search_max_results: usize,

    /// Number of top search results fetched, at most `search_max_results`.
    pub search_fan_out: usize,

    /// Timeout for fetching a search results page.
    pub search_timeout: Duration,

    /// Timeout for fetching a content page.
    pub fetch_timeout: Duration,

    /// Number of prior messages sent as backend context.
    pub history_turns: usize,

    /// Path to persist sessions automatically after each durable write.
    pub transcript_path: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: llama3.2:3b
    /// - Search: 3 results, 1 downloaded, 8 s search and 10 s fetch timeouts
    /// - History: 20 messages
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            search_max_results: DEFAULT_MAX_RESULTS,
            search_fan_out: DEFAULT_SEARCH_FAN_OUT,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            history_turns: DEFAULT_HISTORY_TURNS,
            transcript_path: None,
            use_color: true,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the backend endpoint.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// Sets the retrieval proxy endpoint.
    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = url.into();
        self
    }

    /// Sets how many search results are downloaded, clamped to `1..=search_max_results`.
    pub fn with_search_fan_out(mut self, fan_out: usize) -> Self {
        self.search_fan_out = fan_out.clamp(1, self.search_max_results.max(1));
        self
    }

    /// Sets the search and content-fetch timeouts.
    pub fn with_timeouts(mut self, search: Duration, fetch: Duration) -> Self {
        self.search_timeout = search;
        self.fetch_timeout = fetch;
        self
    }

    /// Sets the number of prior messages sent as context.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Sets the transcript auto-save path.
    pub fn with_transcript_path(mut self, path: Option<PathBuf>) -> Self {
        self.transcript_path = path;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let mut config = ChatConfig {
            model: args.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            backend_url: args
                .backend_url
                .or_else(|| env::var("FIREFLIES_BACKEND_URL").ok())
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            proxy_url: args
                .proxy_url
                .unwrap_or_else(|| DEFAULT_PROXY_URL.to_string()),
            history_turns: args.history_turns.unwrap_or(DEFAULT_HISTORY_TURNS),
            transcript_path: args.transcript.map(PathBuf::from),
            use_color: !args.no_color,
            ..ChatConfig::new()
        };
        if let Some(fan_out) = args.search_fan_out {
            config = config.with_search_fan_out(fan_out);
        }
        config
    }
}
