//! The chat controller.
//!
//! `ChatController` turns submitted text (or an image) into persisted,
//! incrementally rendered assistant messages. It owns the active session, the
//! generation lifecycle, and the active-generation slot, and it reports every
//! change to a [`ChatView`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::chat::config::ChatConfig;
use crate::chat::handlers::CommandHandlers;
use crate::chat::lifecycle::{
    GenerationEvent, GenerationHandle, GenerationSlot, GenerationState, Lifecycle,
};
use crate::chat::orchestrator::{GenerationOutcome, Orchestrator};
use crate::chat::router::{Command, route};
use crate::client::InferenceBackend;
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::observability::{
    GENERATION_DURATION, GENERATIONS_CANCELLED, GENERATIONS_COMPLETED, GENERATIONS_FAILED,
    GENERATIONS_STARTED,
};
use crate::render::ChatView;
use crate::retrieval::ContentRetriever;
use crate::types::{
    ChatSession, ImageAttachment, InferenceRequest, Message, NEW_CHAT_TITLE, Profile, Role,
    SessionId, VISION_MODEL, title_from,
};

/// Appended when the user stops a generation.
pub const STOPPED_MESSAGE: &str = "🛑 **Generation stopped by user**";

/// Appended when the backend or transport fails.
pub const FAILURE_MESSAGE: &str = "❌ Maaf, API LLM sedang mengalami error.\n\n💡 **Alternative:** Use /cari [query] for web search instead!";

/// Prompt used for an image sent without text.
pub const DESCRIBE_IMAGE_PROMPT: &str = "Describe this image in detail in Indonesian language.";

/// Aggregated stats for a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStats {
    /// The model used for chat.
    pub model: String,
    /// The number of sessions in the store.
    pub session_count: usize,
    /// Title of the active session, if any.
    pub active_title: Option<String>,
    /// Messages displayed in the active session.
    pub message_count: usize,
    /// Generations that completed.
    pub completed: u64,
    /// Generations the user stopped.
    pub cancelled: u64,
    /// Generations that failed.
    pub failed: u64,
}

/// Drives chat sessions against a backend, a retriever, and a history store.
pub struct ChatController {
    backend: Arc<dyn InferenceBackend>,
    store: Arc<dyn HistoryStore>,
    handlers: CommandHandlers,
    config: ChatConfig,
    profile: Option<Profile>,
    active_session: Option<SessionId>,
    lifecycle: Lifecycle,
    slot: GenerationSlot,
    completed: u64,
    cancelled: u64,
    failed: u64,
}

impl ChatController {
    /// Creates a controller with no profile and no active session.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        retriever: Arc<dyn ContentRetriever>,
        store: Arc<dyn HistoryStore>,
        config: ChatConfig,
    ) -> Self {
        let handlers = CommandHandlers::new(backend.clone(), retriever, config.search_fan_out);
        Self {
            backend,
            store,
            handlers,
            config,
            profile: None,
            active_session: None,
            lifecycle: Lifecycle::new(),
            slot: GenerationSlot::new(),
            completed: 0,
            cancelled: 0,
            failed: 0,
        }
    }

    /// Sets the authenticated profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Replaces the authenticated profile; `None` blocks chat.
    pub fn set_profile(&mut self, profile: Option<Profile>) {
        self.profile = profile;
    }

    /// The authenticated profile, if any.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The model used for chat.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Changes the model used for chat.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// The history store.
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// The current lifecycle state.
    pub fn state(&self) -> GenerationState {
        self.lifecycle.state()
    }

    /// True while a generation is awaiting its first token or streaming.
    pub fn is_busy(&self) -> bool {
        self.lifecycle.is_busy()
    }

    /// A handle to the active-generation slot that can stop a generation
    /// from another thread, for example a Ctrl+C handler.
    pub fn stopper(&self) -> GenerationSlot {
        self.slot.clone()
    }

    /// Stops the active generation. Returns false if nothing was running.
    pub fn stop_generation(&self) -> bool {
        self.slot.stop()
    }

    /// The active session, if one exists.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    /// Every session, most recently updated first.
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.store.sessions()
    }

    /// The displayed messages of the active session.
    pub fn messages(&self) -> Result<Vec<Message>> {
        match self.active_session {
            Some(session) => self.store.messages(session),
            None => Ok(Vec::new()),
        }
    }

    /// Creates an empty "New Chat" session and makes it active.
    pub async fn new_chat(&mut self) -> Result<SessionId> {
        let session = self.store.create_session(NEW_CHAT_TITLE).await?;
        info!(%session, "new chat");
        self.active_session = Some(session);
        Ok(session)
    }

    /// Makes `session` the active session.
    pub fn select_chat(&mut self, session: SessionId) -> Result<()> {
        self.store.messages(session)?;
        debug!(%session, "chat selected");
        self.active_session = Some(session);
        Ok(())
    }

    /// Renames `session`.
    pub async fn rename_chat(&self, session: SessionId, title: &str) -> Result<()> {
        self.store.update_title(session, title).await
    }

    /// Deletes `session`. Deleting the active session creates a replacement.
    pub async fn delete_chat(&mut self, session: SessionId) -> Result<()> {
        self.store.delete_session(session).await?;
        info!(%session, "chat deleted");
        if self.active_session == Some(session) {
            self.new_chat().await?;
        }
        Ok(())
    }

    /// Submit `text`, optionally with an image, and run it to completion.
    ///
    /// The user message is persisted before any backend request is made. The
    /// input is then routed: commands produce one final assistant message and
    /// chat streams into a placeholder. Backend failures and user stops are
    /// reported as assistant messages rather than errors; an error is returned
    /// only when no profile is present or the store refuses the user message.
    pub async fn send(
        &mut self,
        text: &str,
        image: Option<ImageAttachment>,
        view: &mut dyn ChatView,
    ) -> Result<()> {
        if self.profile.is_none() {
            return Err(Error::authentication("Please log in to use the chat."));
        }
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return Ok(());
        }
        if self.lifecycle.is_busy() {
            self.abandon_stale_generation(view);
        }
        let content = if text.is_empty() {
            DESCRIBE_IMAGE_PROMPT
        } else {
            text
        };

        let session = self.ensure_session(content).await?;
        let first_message = self.store.messages(session)?.is_empty();
        let history = match image {
            Some(_) => Vec::new(),
            None => {
                self.store
                    .history_for_backend(session, self.config.history_turns)
                    .await?
            }
        };

        let user = Message::user(self.store.generate_id(), content);
        self.store.append_message(session, user.clone())?;
        view.message_appended(&user);
        self.store
            .persist_message(session, content, Role::User)
            .await?;
        if first_message {
            self.store.update_title(session, &title_from(content)).await?;
        }

        self.advance(GenerationEvent::Submit, view);
        let handle = self.slot.begin(self.store.generate_id());
        GENERATIONS_STARTED.click();
        let started = Instant::now();

        let command = route(content);
        let model = match image {
            Some(_) => VISION_MODEL,
            None => self.config.model.as_str(),
        };
        debug!(command = command.name(), model, %session, "routing input");
        let outcome = match self
            .handlers
            .handle(&command, model, handle.token())
            .await
        {
            Some(_) if handle.is_cancelled() => GenerationOutcome::Cancelled,
            Some(reply) => self.finish_command(session, &handle, reply, view).await,
            None => {
                let request = match &image {
                    Some(image) => InferenceRequest::vision(content, image.to_data_url()),
                    None => InferenceRequest::chat(content, self.config.model.as_str(), history),
                };
                Orchestrator::new(self.backend.as_ref(), self.store.as_ref(), session)
                    .generate(request, &handle, &mut self.lifecycle, view)
                    .await
            }
        };

        self.settle(session, outcome, view).await;
        self.slot.finish(&handle);
        GENERATION_DURATION.add(started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn ensure_session(&mut self, content: &str) -> Result<SessionId> {
        if let Some(session) = self.active_session {
            return Ok(session);
        }
        let session = self.store.create_session(&title_from(content)).await?;
        info!(%session, "chat created for first message");
        self.active_session = Some(session);
        Ok(session)
    }

    /// Appends and persists the reply of a command.
    async fn finish_command(
        &self,
        session: SessionId,
        handle: &GenerationHandle,
        reply: String,
        view: &mut dyn ChatView,
    ) -> GenerationOutcome {
        let message = Message::assistant(handle.message_id(), reply.as_str());
        if let Err(err) = self.store.append_message(session, message.clone()) {
            return GenerationOutcome::Failed(err);
        }
        view.message_appended(&message);
        match self
            .store
            .persist_message(session, &reply, Role::Assistant)
            .await
        {
            Ok(()) => GenerationOutcome::Completed(reply),
            Err(err) => GenerationOutcome::Failed(err),
        }
    }

    /// Moves the lifecycle to its terminal state, appends the terminal
    /// message for a stop or failure, and returns to idle.
    async fn settle(
        &mut self,
        session: SessionId,
        outcome: GenerationOutcome,
        view: &mut dyn ChatView,
    ) {
        debug!(outcome = outcome.name(), %session, "generation settled");
        match outcome {
            GenerationOutcome::Completed(_) => {
                GENERATIONS_COMPLETED.click();
                self.completed += 1;
                self.advance(GenerationEvent::Finished, view);
            }
            GenerationOutcome::Cancelled => {
                GENERATIONS_CANCELLED.click();
                self.cancelled += 1;
                self.advance(GenerationEvent::Cancel, view);
                self.append_terminal(session, STOPPED_MESSAGE, view).await;
            }
            GenerationOutcome::Failed(err) => {
                GENERATIONS_FAILED.click();
                self.failed += 1;
                warn!(error = %err, "generation failed");
                self.advance(GenerationEvent::Fail, view);
                self.append_terminal(session, FAILURE_MESSAGE, view).await;
            }
        }
        self.advance(GenerationEvent::Reset, view);
    }

    async fn append_terminal(&self, session: SessionId, text: &str, view: &mut dyn ChatView) {
        let message = Message::assistant(self.store.generate_id(), text);
        match self.store.append_message(session, message.clone()) {
            Ok(()) => view.message_appended(&message),
            Err(err) => warn!(error = %err, "could not show terminal message"),
        }
        if let Err(err) = self
            .store
            .persist_message(session, text, Role::Assistant)
            .await
        {
            warn!(error = %err, "could not persist terminal message");
        }
    }

    /// Settles a generation whose future was dropped before it finished.
    fn abandon_stale_generation(&mut self, view: &mut dyn ChatView) {
        warn!(state = ?self.lifecycle.state(), "abandoning unfinished generation");
        self.slot.stop();
        self.advance(GenerationEvent::Cancel, view);
        self.advance(GenerationEvent::Reset, view);
    }

    fn advance(&mut self, event: GenerationEvent, view: &mut dyn ChatView) {
        match self.lifecycle.apply(event) {
            Ok(state) => view.state_changed(state),
            Err(err) => warn!(error = %err, "lifecycle transition rejected"),
        }
    }

    /// Returns the current controller statistics snapshot.
    pub fn stats(&self) -> ChatStats {
        let sessions = self.store.sessions();
        let active = self
            .active_session
            .and_then(|id| sessions.iter().find(|session| session.id == id));
        ChatStats {
            model: self.config.model.clone(),
            session_count: sessions.len(),
            active_title: active.map(|session| session.title.clone()),
            message_count: active.map_or(0, |session| session.messages.len()),
            completed: self.completed,
            cancelled: self.cancelled,
            failed: self.failed,
        }
    }
}
