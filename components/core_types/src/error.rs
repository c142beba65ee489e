//! Error type for the core HTTP primitives.

use thiserror::Error;

/// Errors raised while building or reading requests and responses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// The method string is not a known HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
    /// The URL could not be parsed or resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A body was not valid UTF-8 text
    #[error("Body is not valid UTF-8: {0}")]
    InvalidText(String),
    /// A body could not be parsed as JSON
    #[error("Body is not valid JSON: {0}")]
    InvalidJson(String),
    /// A percent-encoded component was malformed
    #[error("URIError: malformed URI sequence in '{0}'")]
    MalformedUri(String),
}
