//! Error types for the fireflies chat client.
//!
//! Every fallible operation in the crate returns [`Error`]. Most of these never
//! reach the user: the chat controller converts them into a fixed conversation
//! message at the nearest boundary.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::chat::{GenerationEvent, GenerationState};

type Source = Arc<dyn error::Error + Send + Sync>;

/// What a non-success backend status means for the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    /// 400: the request body was rejected.
    BadRequest,
    /// 403: the token is valid but may not use this model or action.
    Forbidden,
    /// 404: unknown model or endpoint.
    NotFound,
    /// 429: too many requests.
    RateLimited,
    /// 500: the model crashed or the backend failed.
    Internal,
    /// 502 to 504: the backend is overloaded or a gateway failed.
    Unavailable,
    /// Any other status.
    Other,
}

impl StatusKind {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => StatusKind::BadRequest,
            403 => StatusKind::Forbidden,
            404 => StatusKind::NotFound,
            429 => StatusKind::RateLimited,
            500 => StatusKind::Internal,
            502..=504 => StatusKind::Unavailable,
            _ => StatusKind::Other,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            StatusKind::BadRequest => "bad request",
            StatusKind::Forbidden => "forbidden",
            StatusKind::NotFound => "not found",
            StatusKind::RateLimited => "rate limited",
            StatusKind::Internal => "internal error",
            StatusKind::Unavailable => "unavailable",
            StatusKind::Other => "unexpected status",
        }
    }
}

/// The main error type for the fireflies crate.
#[derive(Clone, Debug)]
pub enum Error {
    /// The inference backend answered with a non-success status.
    Backend {
        /// HTTP status code.
        status: u16,
        /// Classification of `status`.
        kind: StatusKind,
        /// Message from the error body, or the raw body.
        message: String,
        /// Seconds to wait from a `retry-after` header.
        retry_after: Option<u64>,
    },

    /// No signed-in profile, no API token, or a 401 from the backend.
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// A session or message id the store does not know.
    NotFound {
        /// What kind of thing was looked up.
        what: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A request took longer than its deadline.
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// The operation was cancelled through its cancellation token.
    Abort {
        /// Human-readable error message.
        message: String,
    },

    /// The HTTP request could not be made or its response not read.
    Transport {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// The response body failed while streaming.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// A JSON body or transcript could not be encoded or decoded.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Source>,
    },

    /// Reading or writing a local file failed.
    Io {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Arc<io::Error>,
    },

    /// The retrieval proxy failed or returned nothing usable.
    Retrieval {
        /// Human-readable error message.
        message: String,
    },

    /// A URL could not be built.
    Url {
        /// Underlying cause.
        source: url::ParseError,
    },

    /// User-supplied input was rejected before any request.
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The history store refused a durable write.
    Storage {
        /// Human-readable error message.
        message: String,
    },

    /// A generation lifecycle event was applied in a state that does not accept it.
    InvalidTransition {
        /// The state the lifecycle was in.
        from: GenerationState,
        /// The event that was rejected.
        event: GenerationEvent,
    },
}

impl Error {
    /// Creates an error for a non-success backend status.
    pub fn backend(status: u16, message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::Backend {
            status,
            kind: StatusKind::from_status(status),
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Creates an error for an unknown id.
    pub fn not_found(what: &'static str, id: impl fmt::Display) -> Self {
        Error::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
        }
    }

    /// Creates a new abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Error::Abort {
            message: message.into(),
        }
    }

    /// Creates a new transport error.
    pub fn transport(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Transport {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new retrieval error.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Error::Retrieval {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Creates a new invalid transition error.
    pub fn invalid_transition(from: GenerationState, event: GenerationEvent) -> Self {
        Error::InvalidTransition { from, event }
    }

    /// Returns true if this error is related to authentication.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// Returns true if a store lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is an abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Abort { .. })
    }

    /// Returns true if the backend itself failed rather than rejecting the request.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Error::Backend {
                kind: StatusKind::Internal | StatusKind::Unavailable,
                ..
            }
        )
    }

    /// Returns true if this error came from the history store or its transcript.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Io { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Backend {
                status,
                kind,
                message,
                retry_after,
            } => {
                write!(f, "Backend {} ({status}): {message}", kind.describe())?;
                if let Some(seconds) = retry_after {
                    write!(f, "; retry after {seconds}s")?;
                }
                Ok(())
            }
            Error::Authentication { message } => write!(f, "Authentication error: {message}"),
            Error::NotFound { what, id } => write!(f, "No {what} with id {id}"),
            Error::Timeout { message } => write!(f, "Timed out: {message}"),
            Error::Abort { message } => write!(f, "Request aborted: {message}"),
            Error::Transport { message, .. } => write!(f, "Transport error: {message}"),
            Error::Streaming { message, .. } => write!(f, "Streaming error: {message}"),
            Error::Serialization { message, .. } => write!(f, "Serialization error: {message}"),
            Error::Io { message, source } => write!(f, "{message}: {source}"),
            Error::Retrieval { message } => write!(f, "Retrieval error: {message}"),
            Error::Url { source } => write!(f, "Invalid URL: {source}"),
            Error::Validation { message } => write!(f, "{message}"),
            Error::Storage { message } => write!(f, "Storage error: {message}"),
            Error::InvalidTransition { from, event } => {
                write!(f, "Cannot apply {event:?} while {from:?}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Transport { source, .. }
            | Error::Streaming { source, .. }
            | Error::Serialization { source, .. } => source
                .as_deref()
                .map(|e| e as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source.as_ref()),
            Error::Url { source } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(source: url::ParseError) -> Self {
        Error::Url { source }
    }
}

/// A specialized Result type for fireflies operations.
pub type Result<T> = std::result::Result<T, Error>;
