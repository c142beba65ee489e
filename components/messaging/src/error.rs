//! Errors raised by the messaging layer.

use std::time::Duration;
use thiserror::Error;

use crate::{Action, Message};

/// Errors that can occur while posting or awaiting messages
#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    /// No reply arrived in time; carries the original outgoing message
    #[error("Messaging timeout after {}ms: {message:?}", .after.as_millis())]
    Timeout {
        /// The message that went unanswered
        message: Message,
        /// How long the caller waited
        after: Duration,
    },
    /// The remote side replied with an `error` payload
    #[error("Remote error replying to `{request}`: {error}")]
    Remote {
        /// Action of the original request
        request: Action,
        /// The full reply carrying the error
        reply: Message,
        /// Text of the error
        error: String,
    },
    /// The entangled port is gone
    #[error("Message port closed while posting `{action}`")]
    PortClosed {
        /// Action of the message that could not be posted
        action: Action,
    },
    /// A reply was attempted on an event without transferred ports
    #[error("No reply port attached to `{action}` message")]
    NoReplyPort {
        /// Action of the event
        action: Action,
    },
    /// The target refused the delivery mode or is no longer reachable
    #[error("Failed to deliver message: {0}")]
    Delivery(String),
}

impl MessagingError {
    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, MessagingError::Timeout { .. })
    }
}
