//! Errors raised by the host environment.

use thiserror::Error;

use crate::ServiceWorkerState;
use core_types::CoreError;
use messaging::MessagingError;

/// Failure of a request issued on the network [`Transport`](crate::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request could not be completed
    #[error("NetworkError: Failed to fetch {url}: {reason}")]
    Failed {
        /// Requested URL
        url: String,
        /// Why the request failed
        reason: String,
    },
    /// The request was aborted by the caller
    #[error("AbortError: The request to {0} was aborted")]
    Aborted(String),
    /// A pending response was dropped without ever being resolved
    #[error("NetworkError: The response for {0} was abandoned")]
    Abandoned(String),
}

/// Errors that can occur during host operations
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Operation requires a secure context or a feature that is disabled
    #[error("SecurityError: {0}")]
    Security(String),
    /// Service workers are not available in this browser
    #[error("Service workers are not supported")]
    Unsupported,
    /// No script is served at the given URL
    #[error("Failed to load script {0}: not found")]
    ScriptNotFound(String),
    /// No registration covers the given scope
    #[error("No service worker registration found for scope: {0}")]
    RegistrationNotFound(String),
    /// Worker in invalid state for the operation
    #[error("Invalid service worker state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation expected
        expected: String,
        /// State the worker was in
        actual: ServiceWorkerState,
    },
    /// `respond_with` was called on an event that already has a response
    #[error("InvalidStateError: the fetch event has already been responded to")]
    AlreadyResponded,
    /// An XHR operation was attempted in the wrong ready state
    #[error("InvalidStateError: {0}")]
    XhrState(String),
    /// The page has been closed
    #[error("The window {0} has been closed")]
    WindowClosed(String),
    /// The key/value store failed
    #[error("Storage error: {0}")]
    Storage(String),
    /// The network failed
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// A request or response could not be built or read
    #[error(transparent)]
    Core(#[from] CoreError),
    /// Message delivery failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl From<url::ParseError> for PlatformError {
    fn from(err: url::ParseError) -> Self {
        PlatformError::InvalidUrl(err.to_string())
    }
}
