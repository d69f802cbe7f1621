//! Error types shared across the engine.
//!
//! Every layer wraps the errors it propagates with a short context prefix
//! (`req middleware:`, `http:`, `spider:`, ...). The one error class the
//! scheduler inspects is [`ScavengeError::Dropped`]: a policy decision that a
//! request is terminal and must not be retried. [`ScavengeError::is_dropped`]
//! looks through the wrapping layers so a drop raised inside a middleware is
//! still recognized after the downloader has wrapped it.

use std::io;

/// The error type used throughout the scavenge engine.
#[derive(Debug, thiserror::Error)]
pub enum ScavengeError {
    /// The request was dropped by policy (dedupe, domain filter, ...).
    /// Terminal: the scheduler never retries a dropped request.
    #[error("dropped request: {0}")]
    Dropped(String),

    /// A request-phase middleware failed.
    #[error("req middleware: {0}")]
    RequestMiddleware(#[source] Box<ScavengeError>),

    /// A response-phase middleware failed.
    #[error("resp middleware: {0}")]
    ResponseMiddleware(#[source] Box<ScavengeError>),

    /// The HTTP client failed to produce a response.
    #[error("http: {0}")]
    Http(String),

    /// A spider's response handler failed.
    #[error("spider: {0}")]
    Spider(#[source] Box<ScavengeError>),

    /// An item pipeline failed.
    #[error("pipeline: {0}")]
    Pipeline(#[source] Box<ScavengeError>),

    /// Metadata or snapshot encoding/decoding failed.
    #[error("codec: {0}")]
    Codec(String),

    /// Reading or writing persisted scraping state failed.
    #[error("state: {0}")]
    State(String),

    /// Invalid engine configuration.
    #[error("config: {0}")]
    Config(String),

    /// Anything else, usually raised from user code.
    #[error("{0}")]
    Message(String),
}

impl ScavengeError {
    /// Shorthand for a free-form error, typically used by spiders and
    /// pipelines.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Marks an error as a terminal policy drop.
    pub fn dropped(reason: impl Into<String>) -> Self {
        Self::Dropped(reason.into())
    }

    /// Whether this error (or any error it wraps) is a terminal drop.
    pub fn is_dropped(&self) -> bool {
        match self {
            Self::Dropped(_) => true,
            Self::RequestMiddleware(inner)
            | Self::ResponseMiddleware(inner)
            | Self::Spider(inner)
            | Self::Pipeline(inner) => inner.is_dropped(),
            _ => false,
        }
    }
}

impl From<url::ParseError> for ScavengeError {
    fn from(err: url::ParseError) -> Self {
        Self::Message(format!("parse url: {err}"))
    }
}

impl From<io::Error> for ScavengeError {
    fn from(err: io::Error) -> Self {
        Self::State(err.to_string())
    }
}
