//! Message targets and delivery modes.

use crate::{Message, MessagePort, MessagingError};

/// How a message is handed to its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Post straight to the target's message port
    Directed,
    /// Page-level event delivery with the given target origin
    Broadcast {
        /// Target origin filter, `*` for any
        target_origin: String,
    },
}

impl Delivery {
    /// Broadcast to any origin
    pub fn wildcard() -> Self {
        Delivery::Broadcast {
            target_origin: "*".to_string(),
        }
    }
}

/// Anything a message can be posted to: a worker, a page client, or the
/// page itself.
pub trait MessageTarget: Send + Sync {
    /// Post a message with transferred ports
    fn post_message(
        &self,
        message: Message,
        ports: Vec<MessagePort>,
        delivery: Delivery,
    ) -> Result<(), MessagingError>;

    /// Whether posting to this target re-enters the caller's own context
    fn is_same_context(&self) -> bool {
        false
    }

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

impl<T: MessageTarget + ?Sized> MessageTarget for std::sync::Arc<T> {
    fn post_message(
        &self,
        message: Message,
        ports: Vec<MessagePort>,
        delivery: Delivery,
    ) -> Result<(), MessagingError> {
        (**self).post_message(message, ports, delivery)
    }

    fn is_same_context(&self) -> bool {
        (**self).is_same_context()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
