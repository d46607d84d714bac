// Public modules
pub mod calculator;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod history;
pub mod ndjson;
pub mod observability;
pub mod render;
pub mod retrieval;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{Backend, InferenceBackend, RecordStream};
pub use client_logger::BackendLogger;
pub use error::{Error, Result, StatusKind};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use observability::register_biometrics;
pub use render::{ChatView, PlainTextView};
pub use retrieval::{ContentRetriever, WebRetriever};
pub use types::*;
