//! Chat session and message storage.
//!
//! A store keeps two views of every session: the local display copy, which
//! streaming updates rewrite freely, and the durable log, which only receives
//! final message values through [`HistoryStore::persist_message`].

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{ChatSession, HistoryTurn, Message, MessageId, Role, SessionId};

/// Persistent owner of chat sessions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns a fresh message identifier.
    fn generate_id(&self) -> MessageId {
        MessageId::new()
    }

    /// Creates an empty session and returns its id.
    async fn create_session(&self, title: &str) -> Result<SessionId>;

    /// Appends a message to the local display copy of a session.
    fn append_message(&self, session: SessionId, message: Message) -> Result<()>;

    /// Replaces the displayed content of a message in place.
    fn update_message_content(
        &self,
        session: SessionId,
        id: MessageId,
        content: &str,
    ) -> Result<()>;

    /// Durably records the final text of a message.
    async fn persist_message(&self, session: SessionId, text: &str, role: Role) -> Result<()>;

    /// Changes the title of a session.
    async fn update_title(&self, session: SessionId, title: &str) -> Result<()>;

    /// Removes a session and all of its messages.
    async fn delete_session(&self, session: SessionId) -> Result<()>;

    /// Returns the displayed messages of a session in order.
    fn messages(&self, session: SessionId) -> Result<Vec<Message>>;

    /// Returns the last `max_turns` durable messages formatted for backend context.
    async fn history_for_backend(
        &self,
        session: SessionId,
        max_turns: usize,
    ) -> Result<Vec<HistoryTurn>>;

    /// Returns every session, most recently updated first.
    fn sessions(&self) -> Vec<ChatSession>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: ChatSession,
    durable: Vec<Message>,
}

/// A [`HistoryStore`] held in memory, optionally mirrored to a JSON transcript file.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    sessions: Mutex<Vec<StoredSession>>,
    transcript_path: Option<PathBuf>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store without a transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that saves every durable write to `path`.
    ///
    /// An existing transcript at `path` is loaded first.
    pub fn with_transcript<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            sessions: Mutex::new(Vec::new()),
            transcript_path: Some(path.clone()),
        };
        if path.exists() {
            store.load_transcript_from(&path)?;
        }
        Ok(store)
    }

    /// Returns the configured transcript path, if any.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript_path.as_deref()
    }

    /// Saves the durable state of every session to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let transcript = TranscriptFile::new(&self.lock());
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Loads a transcript from disk, replacing every session in the store.
    pub fn load_transcript_from<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open transcript file", err))?;
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        *self.lock() = transcript
            .sessions
            .into_iter()
            .map(|session| StoredSession {
                durable: session.messages.clone(),
                session,
            })
            .collect();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut StoredSession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.lock();
        let stored = sessions
            .iter_mut()
            .find(|s| s.session.id == id)
            .ok_or_else(|| session_not_found(id))?;
        f(stored)
    }

    fn auto_save_transcript(&self) -> Result<()> {
        if let Some(path) = &self.transcript_path {
            self.save_transcript_to(path)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_session(&self, title: &str) -> Result<SessionId> {
        let session = ChatSession::new(title);
        let id = session.id;
        self.lock().push(StoredSession {
            session,
            durable: Vec::new(),
        });
        debug!(session = %id, "created session");
        self.auto_save_transcript()?;
        Ok(id)
    }

    fn append_message(&self, session: SessionId, message: Message) -> Result<()> {
        self.with_session(session, |stored| {
            stored.session.messages.push(message);
            stored.session.touch();
            Ok(())
        })
    }

    fn update_message_content(
        &self,
        session: SessionId,
        id: MessageId,
        content: &str,
    ) -> Result<()> {
        self.with_session(session, |stored| {
            let message = stored
                .session
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::not_found("message", id))?;
            message.content.clear();
            message.content.push_str(content);
            Ok(())
        })
    }

    async fn persist_message(&self, session: SessionId, text: &str, role: Role) -> Result<()> {
        self.with_session(session, |stored| {
            stored
                .durable
                .push(Message::new(MessageId::new(), role, text));
            stored.session.touch();
            Ok(())
        })?;
        if let Err(err) = self.auto_save_transcript() {
            warn!("failed to save transcript: {err}");
            return Err(Error::storage(format!("failed to save transcript: {err}")));
        }
        Ok(())
    }

    async fn update_title(&self, session: SessionId, title: &str) -> Result<()> {
        self.with_session(session, |stored| {
            stored.session.title = title.to_string();
            stored.session.touch();
            Ok(())
        })?;
        self.auto_save_transcript()
    }

    async fn delete_session(&self, session: SessionId) -> Result<()> {
        {
            let mut sessions = self.lock();
            let before = sessions.len();
            sessions.retain(|s| s.session.id != session);
            if sessions.len() == before {
                return Err(session_not_found(session));
            }
        }
        debug!(session = %session, "deleted session");
        self.auto_save_transcript()
    }

    fn messages(&self, session: SessionId) -> Result<Vec<Message>> {
        self.with_session(session, |stored| Ok(stored.session.messages.clone()))
    }

    async fn history_for_backend(
        &self,
        session: SessionId,
        max_turns: usize,
    ) -> Result<Vec<HistoryTurn>> {
        self.with_session(session, |stored| {
            let skip = stored.durable.len().saturating_sub(max_turns);
            Ok(stored.durable[skip..].iter().map(HistoryTurn::from).collect())
        })
    }

    fn sessions(&self) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> =
            self.lock().iter().map(|s| s.session.clone()).collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }
}

fn session_not_found(id: SessionId) -> Error {
    Error::not_found("session", id)
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    sessions: Vec<ChatSession>,
}

impl TranscriptFile {
    fn new(sessions: &[StoredSession]) -> Self {
        Self {
            version: 1,
            sessions: sessions
                .iter()
                .map(|stored| ChatSession {
                    messages: stored.durable.clone(),
                    ..stored.session.clone()
                })
                .collect(),
        }
    }
}
