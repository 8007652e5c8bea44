use std::sync::Arc;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the manager.
///
/// Only [`Error::Uninitialized`] can be returned from flag evaluation, and only when strict mode is
/// enabled. Refresh-cycle failures ([`Error::Fetch`], [`Error::EngineBuild`]) are logged by the
/// refresh thread and never reach evaluation callers.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A flag was evaluated before the first configuration document was fetched.
    #[error("flag evaluated before the first configuration document was fetched")]
    Uninitialized,

    /// Fetching the configuration document failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Building an evaluation engine from a fetched document failed.
    #[error(transparent)]
    EngineBuild(#[from] EngineBuildError),

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The refresh thread was stopped before the first configuration document was fetched.
    #[error("refresh thread stopped before the first configuration document was fetched")]
    Stopped,

    /// Indicates that the refresh thread panicked. This should normally never happen.
    #[error("refresh thread panicked")]
    RefreshThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Failure to fetch one configuration document.
#[derive(thiserror::Error, Debug, Clone)]
pub enum FetchError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("network error while fetching configuration")]
    Network(#[source] Arc<reqwest::Error>),

    /// The server answered with a non-2xx status.
    #[error("received non-2xx response while fetching configuration: {0}")]
    Status(u16),

    /// The response body is not a valid JSON document.
    #[error("failed to parse configuration document")]
    Parse(#[source] Arc<serde_json::Error>),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        FetchError::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        FetchError::Parse(Arc::new(value))
    }
}

/// The engine factory rejected a configuration document.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to build evaluation engine: {message}")]
pub struct EngineBuildError {
    message: String,
}

impl EngineBuildError {
    /// Create a build error with a human-readable reason.
    pub fn new(message: impl Into<String>) -> Self {
        EngineBuildError {
            message: message.into(),
        }
    }

    /// Reason the document was rejected.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for EngineBuildError {
    fn from(value: serde_json::Error) -> Self {
        EngineBuildError::new(value.to_string())
    }
}
