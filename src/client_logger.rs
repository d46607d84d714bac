//! Logging trait for inference backend operations.
//!
//! This module provides the [`BackendLogger`] trait that allows users to capture
//! and log every interaction passing through the [`Backend`](crate::Backend) client.

use crate::{InferenceReply, InferenceRequest, StreamRecord};

/// A trait for logging backend operations.
///
/// Implement this trait to capture and record all backend interactions,
/// including request bodies, single-shot replies, and individual stream records.
///
/// # Example
///
/// ```rust,ignore
/// use fireflies::{BackendLogger, InferenceReply, InferenceRequest, StreamRecord};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl BackendLogger for FileLogger {
///     fn log_request(&self, request: &InferenceRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_reply(&self, reply: &InferenceReply) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Reply: {}", serde_json::to_string(reply).unwrap()).unwrap();
///     }
///
///     fn log_stream_record(&self, record: &StreamRecord) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Record: {}", serde_json::to_string(record).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait BackendLogger: Send + Sync {
    /// Log a request body before it is sent.
    fn log_request(&self, request: &InferenceRequest);

    /// Log the reply of a successful single-shot `send` call.
    fn log_reply(&self, reply: &InferenceReply);

    /// Log one decoded record of a streaming response.
    ///
    /// Malformed lines never reach the logger; they are skipped by the decoder.
    fn log_stream_record(&self, record: &StreamRecord);
}
