//! Key/value storage bridged from the server to a connected page.
//!
//! A worker has no persistent store of its own that survives updates, so
//! [`Storage`] forwards every operation as a message to a connected page,
//! which answers from its window's [`KeyValueStore`].

use serde_json::Value;
use std::sync::Arc;

use crate::{ClientRegistry, ServerError};
use messaging::{send_request, Action, Message, MessageEvent, Timeout};
use web_platform::{KeyValueStore, PlatformError};

/// Asynchronous key/value store of a server
#[derive(Clone)]
pub struct Storage {
    registry: Arc<ClientRegistry>,
    timeout: Timeout,
}

impl Storage {
    pub(crate) fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            timeout: Timeout::Default,
        }
    }

    /// Use a different reply timeout
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&self, message: Message) -> Result<Option<Value>, ServerError> {
        let target = self.registry.get_available()?;
        let reply = send_request(target.as_ref(), message, self.timeout).await?;
        Ok(reply.result().cloned())
    }

    /// Read `key`; `None` when it is not set
    pub async fn get(&self, key: &str) -> Result<Option<Value>, ServerError> {
        let value = self
            .request(Message::new(Action::GetStorage).with("key", key))
            .await?;
        Ok(value.filter(|v| !v.is_null()))
    }

    /// Write `key`, returning the stored value
    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<Value, ServerError> {
        let value = self
            .request(
                Message::new(Action::SetStorage)
                    .with("key", key)
                    .with("value", value),
            )
            .await?;
        Ok(value.unwrap_or(Value::Null))
    }

    /// Delete `key`
    pub async fn remove(&self, key: &str) -> Result<(), ServerError> {
        self.request(Message::new(Action::RemoveStorage).with("key", key))
            .await?;
        Ok(())
    }

    /// Delete every key
    pub async fn clear(&self) -> Result<(), ServerError> {
        self.request(Message::new(Action::ClearStorage)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Answer a storage message from `store` on the event's reply port.
///
/// Returns `false` for messages that are not storage requests.
pub(crate) fn serve_storage(store: Arc<dyn KeyValueStore>, event: &MessageEvent) -> bool {
    if !event.data.action.is_storage() {
        return false;
    }
    let Some(port) = event.reply_handle() else {
        tracing::debug!(action = %event.data.action, "storage request without a reply port");
        return true;
    };
    let request = event.data.clone();
    tokio::spawn(async move {
        let reply = match apply(store.as_ref(), &request).await {
            Ok(result) => Message::success(result),
            Err(err) => {
                tracing::debug!(action = %request.action, error = %err, "storage request failed");
                Message::failure(err.to_string())
            }
        };
        if let Err(err) = port.post_message(reply) {
            tracing::debug!(action = %request.action, error = %err, "storage reply not delivered");
        }
    });
    true
}

async fn apply(store: &dyn KeyValueStore, request: &Message) -> Result<Value, PlatformError> {
    let key = || {
        request
            .get_str("key")
            .ok_or_else(|| PlatformError::Storage(format!("`{}` requires a key", request.action)))
    };
    match request.action {
        Action::GetStorage => Ok(store.get(key()?).await?.unwrap_or(Value::Null)),
        Action::SetStorage => {
            let value = request.get("value").cloned().unwrap_or(Value::Null);
            store.set(key()?, value).await
        }
        Action::RemoveStorage => {
            store.remove(key()?).await?;
            Ok(Value::Null)
        }
        Action::ClearStorage => {
            store.clear().await?;
            Ok(Value::Null)
        }
        _ => Err(PlatformError::Storage(format!(
            "`{}` is not a storage action",
            request.action
        ))),
    }
}
