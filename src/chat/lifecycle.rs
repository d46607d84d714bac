//! Generation lifecycle state machine and the active-generation slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::MessageId;

/// Where the current generation is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationState {
    /// Nothing in flight; input is accepted.
    #[default]
    Idle,
    /// The request is sent and no response has arrived yet.
    AwaitingFirstToken,
    /// The response is open and the placeholder message is being filled.
    Streaming,
    /// The user stopped the generation.
    Cancelled,
    /// The generation finished normally.
    Completed,
    /// The backend or transport failed.
    Failed,
}

impl GenerationState {
    /// Returns true for `Cancelled`, `Completed`, and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GenerationState::Cancelled | GenerationState::Completed | GenerationState::Failed
        )
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationEvent {
    /// The user submitted input.
    Submit,
    /// The backend response opened and the placeholder exists.
    Opened,
    /// The response ended normally.
    Finished,
    /// The user asked to stop.
    Cancel,
    /// The request or stream failed.
    Fail,
    /// Return a settled generation to idle.
    Reset,
}

/// Compute the state that follows `state` on `event`.
///
/// `Finished` is accepted while awaiting the first token as well as while
/// streaming, since single-shot commands complete without ever opening a stream.
pub fn transition(state: GenerationState, event: GenerationEvent) -> Result<GenerationState> {
    use GenerationEvent as E;
    use GenerationState as S;
    match (state, event) {
        (S::Idle, E::Submit) => Ok(S::AwaitingFirstToken),
        (S::AwaitingFirstToken, E::Opened) => Ok(S::Streaming),
        (S::AwaitingFirstToken | S::Streaming, E::Finished) => Ok(S::Completed),
        (S::AwaitingFirstToken | S::Streaming, E::Cancel) => Ok(S::Cancelled),
        (S::Idle | S::AwaitingFirstToken | S::Streaming, E::Fail) => Ok(S::Failed),
        (S::Idle | S::Cancelled | S::Completed | S::Failed, E::Reset) => Ok(S::Idle),
        (state, event) => Err(Error::invalid_transition(state, event)),
    }
}

/// The current lifecycle state of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    state: GenerationState,
}

impl Lifecycle {
    /// Creates an idle lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Applies `event`, leaving the state unchanged on an invalid transition.
    pub fn apply(&mut self, event: GenerationEvent) -> Result<GenerationState> {
        let next = transition(self.state, event)?;
        debug!(from = ?self.state, ?event, to = ?next, "generation transition");
        self.state = next;
        Ok(next)
    }

    /// True while waiting for the first token; shown as a typing indicator.
    pub fn is_typing(&self) -> bool {
        self.state == GenerationState::AwaitingFirstToken
    }

    /// True while a response is streaming.
    pub fn is_generating(&self) -> bool {
        self.state == GenerationState::Streaming
    }

    /// True while input should be refused.
    pub fn is_busy(&self) -> bool {
        self.is_typing() || self.is_generating()
    }
}

/// The cancellation handle of one generation.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    message_id: MessageId,
    token: CancellationToken,
}

impl GenerationHandle {
    /// The placeholder message this generation fills.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The token observed by every suspension point of the generation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the generation was stopped.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The exclusive slot holding the active generation.
///
/// Clones share the slot, so a signal handler can stop a generation while
/// the controller is suspended.
#[derive(Debug, Clone, Default)]
pub struct GenerationSlot {
    active: Arc<Mutex<Option<GenerationHandle>>>,
}

impl GenerationSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<GenerationHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a new generation, cancelling any previous one.
    pub fn begin(&self, message_id: MessageId) -> GenerationHandle {
        let handle = GenerationHandle {
            message_id,
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.lock().replace(handle.clone()) {
            debug!(message = %previous.message_id, "cancelling superseded generation");
            previous.token.cancel();
        }
        handle
    }

    /// Cancels the active generation. Returns false if none was active.
    pub fn stop(&self) -> bool {
        match self.lock().as_ref() {
            Some(handle) if !handle.token.is_cancelled() => {
                handle.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Clears the slot if it still holds `handle`.
    pub fn finish(&self, handle: &GenerationHandle) {
        let mut active = self.lock();
        if active
            .as_ref()
            .is_some_and(|current| current.message_id == handle.message_id)
        {
            *active = None;
        }
    }

    /// True while a generation occupies the slot.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }
}
