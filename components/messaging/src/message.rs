//! Message envelope and delivered message events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Action, ClientId, MessagePort, MessagingError, PortSender};

/// Envelope `{ action, ...payload }` sent across a message channel.
///
/// Replies use the same shape and may carry a `result` or an `error`
/// object (`{ message, ... }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// What the message asks for
    pub action: Action,
    /// Remaining fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Create a message with an empty payload
    pub fn new(action: Action) -> Self {
        Self {
            action,
            payload: Map::new(),
        }
    }

    /// Add a payload field (builder style)
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// A `success` reply carrying `result`
    pub fn success(result: impl Into<Value>) -> Self {
        Message::new(Action::Success).with("result", result)
    }

    /// A `failed` reply carrying an error object built from `message`
    pub fn failure(message: impl Into<String>) -> Self {
        let mut error = Map::new();
        error.insert("message".to_string(), Value::String(message.into()));
        Message::new(Action::Failed).with("error", Value::Object(error))
    }

    /// Read a payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Read a string payload field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// The `result` field of a reply
    pub fn result(&self) -> Option<&Value> {
        self.get("result")
    }

    /// The `error` field of a reply, unless it is absent or null
    pub fn error(&self) -> Option<&Value> {
        self.get("error").filter(|v| !v.is_null())
    }

    /// Human-readable text of the `error` field
    pub fn error_message(&self) -> Option<String> {
        self.error().map(|err| match err.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => err.to_string(),
        })
    }
}

/// A message as delivered to a context's listeners
#[derive(Debug)]
pub struct MessageEvent {
    /// The posted message
    pub data: Message,
    /// Ports transferred with the message
    pub ports: Vec<MessagePort>,
    /// The posting client, when the platform reports it
    pub source: Option<ClientId>,
    /// Target origin used for delivery (`*` for broadcasts)
    pub origin: String,
}

impl MessageEvent {
    /// Create an event without ports or source
    pub fn new(data: Message) -> Self {
        Self {
            data,
            ports: Vec::new(),
            source: None,
            origin: String::new(),
        }
    }

    /// Handle for replying on the first transferred port
    pub fn reply_handle(&self) -> Option<PortSender> {
        self.ports.first().map(MessagePort::sender)
    }

    /// Reply on the first transferred port
    pub fn reply(&self, message: Message) -> Result<(), MessagingError> {
        let port = self.ports.first().ok_or(MessagingError::NoReplyPort {
            action: self.data.action.clone(),
        })?;
        port.post_message(message)
    }
}
