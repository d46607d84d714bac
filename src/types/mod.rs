// Public modules
pub mod image;
pub mod message;
pub mod profile;
pub mod request;
pub mod session;
pub mod stream_record;

// Re-exports
pub use image::ImageAttachment;
pub use message::{Message, MessageId, Role};
pub use profile::{PlanTier, Profile};
pub use request::{Action, HistoryTurn, InferenceReply, InferenceRequest, VISION_MODEL};
pub use session::{ChatSession, NEW_CHAT_TITLE, SessionId, TITLE_MAX_CHARS, title_from};
pub use stream_record::StreamRecord;
