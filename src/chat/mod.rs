//! Chat orchestration: routing, generation lifecycle, and streaming.
//!
//! This module turns submitted text into persisted, incrementally rendered
//! assistant messages. It supports:
//!
//! - Streaming responses rendered as full-text snapshots
//! - In-chat commands for web search, page reading, arithmetic, and context reset
//! - Cooperative cancellation of the active generation
//! - Multiple sessions backed by a [`HistoryStore`](crate::history::HistoryStore)
//!
//! # Architecture
//!
//! - [`router`]: classification of input into commands
//! - [`handlers`]: command handlers that produce one final message
//! - [`orchestrator`]: streaming a backend response into a placeholder message
//! - [`lifecycle`]: the generation state machine and the active-generation slot
//! - [`controller`]: the entry point tying these together
//! - [`config`] and [`commands`]: configuration and REPL commands for the binary

pub mod commands;
pub mod config;
pub mod controller;
pub mod handlers;
pub mod lifecycle;
pub mod orchestrator;
pub mod router;

pub use crate::render::{ChatView, PlainTextView};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_MODEL};
pub use controller::{
    ChatController, ChatStats, DESCRIBE_IMAGE_PROMPT, FAILURE_MESSAGE, STOPPED_MESSAGE,
};
pub use handlers::CommandHandlers;
pub use lifecycle::{
    GenerationEvent, GenerationHandle, GenerationSlot, GenerationState, Lifecycle, transition,
};
pub use orchestrator::{GenerationOutcome, NO_RESPONSE, Orchestrator, collect};
pub use router::{Command, route};
