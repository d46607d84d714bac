//! Streaming generation into a placeholder assistant message.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::lifecycle::{GenerationEvent, GenerationHandle, Lifecycle};
use crate::client::InferenceBackend;
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::render::ChatView;
use crate::types::{InferenceReply, InferenceRequest, Message, Role, SessionId};

/// Substituted when a response ends without any text.
pub const NO_RESPONSE: &str = "Maaf, tidak ada respons dari AI.";

/// Substituted when a collected answer could not be produced.
pub const COLLECT_FAILED: &str = "Maaf, terjadi kesalahan saat menghubungi AI.";

/// How a generation ended.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// The final text was persisted.
    Completed(String),
    /// The user stopped the generation; nothing final was persisted.
    Cancelled,
    /// The backend, transport, or store failed.
    Failed(Error),
}

impl GenerationOutcome {
    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            GenerationOutcome::Completed(_) => "completed",
            GenerationOutcome::Cancelled => "cancelled",
            GenerationOutcome::Failed(_) => "failed",
        }
    }
}

/// Streams one backend response into the active session.
pub struct Orchestrator<'a> {
    backend: &'a dyn InferenceBackend,
    store: &'a dyn HistoryStore,
    session: SessionId,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator writing into `session`.
    pub fn new(
        backend: &'a dyn InferenceBackend,
        store: &'a dyn HistoryStore,
        session: SessionId,
    ) -> Self {
        Self {
            backend,
            store,
            session,
        }
    }

    /// Run `request` and fill the placeholder identified by `handle`.
    ///
    /// The placeholder is appended once the response opens, and every applied
    /// chunk replaces its displayed content with the full accumulated text. The
    /// final text is persisted exactly once, after the stream ends. Once the
    /// handle's token is cancelled no further record is read or applied.
    ///
    /// The lifecycle is moved to `Streaming` here; settling the terminal state
    /// is left to the caller.
    pub async fn generate(
        &self,
        request: InferenceRequest,
        handle: &GenerationHandle,
        lifecycle: &mut Lifecycle,
        view: &mut dyn ChatView,
    ) -> GenerationOutcome {
        let cancel = handle.token();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return GenerationOutcome::Cancelled,
            opened = self.backend.stream(request) => opened,
        };
        let mut records = match opened {
            Ok(records) => records,
            Err(err) => return GenerationOutcome::Failed(err),
        };

        let id = handle.message_id();
        let placeholder = Message::assistant(id, "");
        if let Err(err) = self.store.append_message(self.session, placeholder.clone()) {
            return GenerationOutcome::Failed(err);
        }
        view.message_appended(&placeholder);
        match lifecycle.apply(GenerationEvent::Opened) {
            Ok(state) => view.state_changed(state),
            Err(err) => warn!(error = %err, "lifecycle rejected stream open"),
        }

        let mut content = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(message = %id, applied = content.len(), "generation stopped");
                    return GenerationOutcome::Cancelled;
                }
                next = records.next() => next,
            };
            match next {
                Some(Ok(record)) => {
                    let Some(chunk) = record.chunk_content() else {
                        continue;
                    };
                    content.push_str(chunk);
                    if let Err(err) = self.store.update_message_content(self.session, id, &content)
                    {
                        return GenerationOutcome::Failed(err);
                    }
                    view.message_updated(id, &content);
                }
                Some(Err(err)) => return GenerationOutcome::Failed(err),
                None => break,
            }
        }
        // Dropping the stream releases the connection before the durable write.
        drop(records);

        if content.is_empty() {
            content = NO_RESPONSE.to_string();
            if let Err(err) = self.store.update_message_content(self.session, id, &content) {
                return GenerationOutcome::Failed(err);
            }
            view.message_updated(id, &content);
        }
        match self
            .store
            .persist_message(self.session, &content, Role::Assistant)
            .await
        {
            Ok(()) => GenerationOutcome::Completed(content),
            Err(err) => GenerationOutcome::Failed(err),
        }
    }
}

/// Send a single-shot request, giving up when `cancel` fires.
pub async fn send_cancellable(
    backend: &dyn InferenceBackend,
    request: InferenceRequest,
    cancel: &CancellationToken,
) -> Result<InferenceReply> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::abort("request cancelled")),
        reply = backend.send(request) => reply,
    }
}

/// Stream `request` to completion and return the concatenated chunk text.
///
/// Used by command handlers, which produce one final message rather than
/// streaming into the view. Failures and cancellation give [`COLLECT_FAILED`];
/// an empty answer gives [`NO_RESPONSE`].
pub async fn collect(
    backend: &dyn InferenceBackend,
    request: InferenceRequest,
    cancel: &CancellationToken,
) -> String {
    match try_collect(backend, request, cancel).await {
        Ok(answer) if answer.is_empty() => NO_RESPONSE.to_string(),
        Ok(answer) => answer,
        Err(err) => {
            warn!(error = %err, "collecting answer failed");
            COLLECT_FAILED.to_string()
        }
    }
}

async fn try_collect(
    backend: &dyn InferenceBackend,
    request: InferenceRequest,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut records = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::abort("request cancelled")),
        opened = backend.stream(request) => opened?,
    };
    let mut answer = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::abort("request cancelled")),
            next = records.next() => next,
        };
        match next {
            Some(record) => {
                if let Some(chunk) = record?.chunk_content() {
                    answer.push_str(chunk);
                }
            }
            None => return Ok(answer),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::chat::lifecycle::{GenerationSlot, GenerationState};
    use crate::client::RecordStream;
    use crate::history::InMemoryHistoryStore;
    use crate::types::{MessageId, StreamRecord};

    /// Replays a fixed list of records, or fails on open.
    struct ScriptedBackend {
        records: Vec<Result<StreamRecord>>,
        fail_open: bool,
    }

    impl ScriptedBackend {
        fn chunks(chunks: &[&str]) -> Self {
            Self {
                records: chunks
                    .iter()
                    .map(|c| Ok(StreamRecord::chunk(*c)))
                    .collect(),
                fail_open: false,
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn send(&self, _: InferenceRequest) -> Result<InferenceReply> {
            Ok(InferenceReply::default())
        }

        async fn stream(&self, _: InferenceRequest) -> Result<RecordStream> {
            if self.fail_open {
                return Err(Error::backend(503, "down", None));
            }
            let records: Vec<Result<StreamRecord>> = self
                .records
                .iter()
                .map(|r| match r {
                    Ok(record) => Ok(record.clone()),
                    Err(_) => Err(Error::streaming("connection reset", None)),
                })
                .collect();
            Ok(Box::pin(stream::iter(records)))
        }
    }

    /// Records what the orchestrator showed, and can stop the generation
    /// after a given number of updates.
    #[derive(Default)]
    struct RecordingView {
        appended: Vec<Message>,
        snapshots: Vec<String>,
        states: Vec<GenerationState>,
        stop_after: Option<(usize, GenerationSlot)>,
    }

    impl ChatView for RecordingView {
        fn message_appended(&mut self, message: &Message) {
            self.appended.push(message.clone());
        }

        fn message_updated(&mut self, _: MessageId, snapshot: &str) {
            self.snapshots.push(snapshot.to_string());
            if let Some((after, slot)) = &self.stop_after
                && self.snapshots.len() == *after
            {
                slot.stop();
            }
        }

        fn state_changed(&mut self, state: GenerationState) {
            self.states.push(state);
        }

        fn print_info(&mut self, _: &str) {}

        fn print_error(&mut self, _: &str) {}
    }

    async fn run(
        backend: &ScriptedBackend,
        view: &mut RecordingView,
        slot: &GenerationSlot,
    ) -> (GenerationOutcome, Arc<InMemoryHistoryStore>, SessionId) {
        let store = Arc::new(InMemoryHistoryStore::new());
        let session = store.create_session("test").await.unwrap();
        let handle = slot.begin(MessageId::new());
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(GenerationEvent::Submit).unwrap();
        let orchestrator = Orchestrator::new(backend, store.as_ref(), session);
        let outcome = orchestrator
            .generate(
                InferenceRequest::new("hi", "m"),
                &handle,
                &mut lifecycle,
                view,
            )
            .await;
        (outcome, store, session)
    }

    #[tokio::test]
    async fn snapshots_accumulate_and_persist_once() {
        let backend = ScriptedBackend::chunks(&["Hal", "o ", "dunia"]);
        let mut view = RecordingView::default();
        let slot = GenerationSlot::new();
        let (outcome, store, session) = run(&backend, &mut view, &slot).await;

        assert!(matches!(outcome, GenerationOutcome::Completed(ref text) if text == "Halo dunia"));
        assert_eq!(view.snapshots, vec!["Hal", "Halo ", "Halo dunia"]);
        assert_eq!(view.states, vec![GenerationState::Streaming]);
        assert_eq!(view.appended.len(), 1);
        assert_eq!(view.appended[0].content, "");

        let history = store.history_for_backend(session, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Halo dunia");
        let displayed = store.messages(session).unwrap();
        assert_eq!(displayed[0].content, "Halo dunia");
    }

    #[tokio::test]
    async fn non_chunk_records_are_ignored() {
        let backend = ScriptedBackend {
            records: vec![
                Ok(StreamRecord::Other),
                Ok(StreamRecord::chunk("a")),
                Ok(StreamRecord::chunk("")),
                Ok(StreamRecord::chunk("b")),
            ],
            fail_open: false,
        };
        let mut view = RecordingView::default();
        let (outcome, _, _) = run(&backend, &mut view, &GenerationSlot::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Completed(ref text) if text == "ab"));
        assert_eq!(view.snapshots, vec!["a", "ab"]);
    }

    #[tokio::test]
    async fn empty_stream_persists_no_response() {
        let backend = ScriptedBackend::chunks(&[]);
        let mut view = RecordingView::default();
        let (outcome, store, session) = run(&backend, &mut view, &GenerationSlot::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Completed(ref text) if text == NO_RESPONSE));
        let history = store.history_for_backend(session, 10).await.unwrap();
        assert_eq!(history[0].content, NO_RESPONSE);
    }

    #[tokio::test]
    async fn cancellation_stops_applying_chunks() {
        let backend = ScriptedBackend::chunks(&["one ", "two ", "three"]);
        let slot = GenerationSlot::new();
        let mut view = RecordingView {
            stop_after: Some((1, slot.clone())),
            ..RecordingView::default()
        };
        let (outcome, store, session) = run(&backend, &mut view, &slot).await;

        assert!(matches!(outcome, GenerationOutcome::Cancelled));
        assert_eq!(view.snapshots, vec!["one "]);
        assert!(store.history_for_backend(session, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_open_does_nothing() {
        let backend = ScriptedBackend::chunks(&["x"]);
        let slot = GenerationSlot::new();
        let store = InMemoryHistoryStore::new();
        let session = store.create_session("t").await.unwrap();
        let handle = slot.begin(MessageId::new());
        slot.stop();
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(GenerationEvent::Submit).unwrap();
        let mut view = RecordingView::default();
        let outcome = Orchestrator::new(&backend, &store, session)
            .generate(InferenceRequest::new("hi", "m"), &handle, &mut lifecycle, &mut view)
            .await;
        assert!(matches!(outcome, GenerationOutcome::Cancelled));
        assert!(view.appended.is_empty());
        assert_eq!(lifecycle.state(), GenerationState::AwaitingFirstToken);
    }

    #[tokio::test]
    async fn open_failure_is_failed_without_placeholder() {
        let backend = ScriptedBackend {
            records: Vec::new(),
            fail_open: true,
        };
        let mut view = RecordingView::default();
        let (outcome, _, _) = run(&backend, &mut view, &GenerationSlot::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Failed(ref err) if err.is_server_error()));
        assert!(view.appended.is_empty());
    }

    #[tokio::test]
    async fn stream_error_is_failed_and_not_persisted() {
        let backend = ScriptedBackend {
            records: vec![
                Ok(StreamRecord::chunk("partial")),
                Err(Error::streaming("reset", None)),
                Ok(StreamRecord::chunk("never")),
            ],
            fail_open: false,
        };
        let mut view = RecordingView::default();
        let (outcome, store, session) = run(&backend, &mut view, &GenerationSlot::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
        assert_eq!(view.snapshots, vec!["partial"]);
        assert!(store.history_for_backend(session, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collect_concatenates_and_substitutes() {
        let cancel = CancellationToken::new();
        let backend = ScriptedBackend::chunks(&["jawa", "ban"]);
        assert_eq!(
            collect(&backend, InferenceRequest::new("q", "m"), &cancel).await,
            "jawaban"
        );
        let empty = ScriptedBackend::chunks(&[]);
        assert_eq!(
            collect(&empty, InferenceRequest::new("q", "m"), &cancel).await,
            NO_RESPONSE
        );
        let down = ScriptedBackend {
            records: Vec::new(),
            fail_open: true,
        };
        assert_eq!(
            collect(&down, InferenceRequest::new("q", "m"), &cancel).await,
            COLLECT_FAILED
        );
    }

    #[tokio::test]
    async fn send_cancellable_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = ScriptedBackend::chunks(&[]);
        let err = send_cancellable(&backend, InferenceRequest::new("q", "m"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }

    #[test]
    fn outcome_names() {
        assert_eq!(GenerationOutcome::Cancelled.name(), "cancelled");
        assert_eq!(
            GenerationOutcome::Completed(String::new()).name(),
            "completed"
        );
    }
}
