//! Errors raised while registering routes or building responses.

use thiserror::Error;

use core_types::CoreError;
use web_platform::PlatformError;

/// Errors produced by routers and the request/response façades
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// A path pattern could not be compiled
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },
    /// A base URL or forward target could not be resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The response has already been finalized
    #[error("Response has already been sent")]
    AlreadySent,
    /// The request body has a content type the accessor cannot parse
    #[error("Unsupported content type for {accessor}: {content_type}")]
    UnsupportedContentType {
        /// Accessor that was called
        accessor: &'static str,
        /// Content type found on the request
        content_type: String,
    },
    /// A body could not be serialized
    #[error("Failed to serialize body: {0}")]
    Serialize(String),
    /// A handler reported a failure of its own
    #[error("{0}")]
    Handler(String),
    /// Reading the request failed
    #[error(transparent)]
    Core(#[from] CoreError),
    /// The host environment rejected an operation
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl RouterError {
    /// Shorthand for a handler-level failure
    pub fn handler(message: impl Into<String>) -> Self {
        RouterError::Handler(message.into())
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Serialize(err.to_string())
    }
}

impl From<url::ParseError> for RouterError {
    fn from(err: url::ParseError) -> Self {
        RouterError::InvalidUrl(err.to_string())
    }
}
