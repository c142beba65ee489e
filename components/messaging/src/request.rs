//! Request/reply over a dedicated channel, and fire-and-forget posts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Delivery, Message, MessageChannel, MessageTarget, MessagingError};

/// Reply timeout used when none (or zero) is given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// How long [`send_request`] waits for a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeout {
    /// [`DEFAULT_TIMEOUT`]
    #[default]
    Default,
    /// A specific duration; zero means [`DEFAULT_TIMEOUT`]
    After(Duration),
    /// Wait forever
    Never,
}

impl Timeout {
    /// Timeout in milliseconds; `0` means the default
    pub fn from_millis(ms: u64) -> Self {
        Timeout::After(Duration::from_millis(ms))
    }

    /// The effective wait, `None` for [`Timeout::Never`]
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Default => Some(DEFAULT_TIMEOUT),
            Timeout::After(d) if d.is_zero() => Some(DEFAULT_TIMEOUT),
            Timeout::After(d) => Some(*d),
            Timeout::Never => None,
        }
    }
}

impl From<Option<u64>> for Timeout {
    fn from(ms: Option<u64>) -> Self {
        ms.map(Timeout::from_millis).unwrap_or_default()
    }
}

/// Send `message` to `target` and wait for exactly one reply.
///
/// A fresh port pair is allocated per call and released when the call
/// completes, whatever the outcome. A reply carrying an `error` field is
/// returned as [`MessagingError::Remote`]. Targets in the caller's own
/// context receive the message as a wildcard-origin broadcast.
pub async fn send_request(
    target: &dyn MessageTarget,
    message: Message,
    timeout: Timeout,
) -> Result<Message, MessagingError> {
    let MessageChannel {
        port1: mut local,
        port2: remote,
    } = MessageChannel::new();

    let delivery = if target.is_same_context() {
        Delivery::wildcard()
    } else {
        Delivery::Directed
    };

    tracing::debug!(
        action = %message.action,
        target = %target.describe(),
        "sending message request"
    );
    target.post_message(message.clone(), vec![remote], delivery)?;

    let wait_reply = async {
        match local.recv().await {
            Some(reply) => reply,
            // The remote dropped the port unanswered, which looks exactly
            // like a target that never replies.
            None => std::future::pending().await,
        }
    };

    let outcome = match timeout.duration() {
        Some(after) => tokio::time::timeout(after, wait_reply)
            .await
            .map_err(|_| after),
        None => Ok(wait_reply.await),
    };
    local.close();

    let reply = outcome.map_err(|after| MessagingError::Timeout {
        message: message.clone(),
        after,
    })?;

    if let Some(error) = reply.error_message() {
        return Err(MessagingError::Remote {
            request: message.action,
            reply,
            error,
        });
    }
    Ok(reply)
}

/// Post `message` without waiting for, or allowing, a reply.
///
/// Delivery is lossy: nothing tells the caller whether the target ever saw
/// the message.
pub fn post(target: &dyn MessageTarget, message: Message) -> Result<(), MessagingError> {
    let delivery = if target.is_same_context() {
        Delivery::wildcard()
    } else {
        Delivery::Directed
    };
    tracing::debug!(
        action = %message.action,
        target = %target.describe(),
        "posting message"
    );
    target.post_message(message, Vec::new(), delivery)
}
