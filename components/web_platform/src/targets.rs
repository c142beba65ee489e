//! Message targets for posting from a page.

use std::sync::Arc;

use crate::{GlobalScope, Origin, ServiceWorker};
use messaging::{ClientId, Delivery, Message, MessageEvent, MessagePort, MessageTarget, MessagingError};

/// A service worker, as seen from the page posting to it
#[derive(Debug, Clone)]
pub struct WorkerTarget {
    worker: Arc<ServiceWorker>,
    source: Option<ClientId>,
    origin: String,
}

impl WorkerTarget {
    /// Post to `worker`, reporting `source` as the sender when known
    pub fn new(worker: Arc<ServiceWorker>, source: Option<ClientId>, origin: &Origin) -> Self {
        Self {
            worker,
            source,
            origin: origin.serialize(),
        }
    }

    /// The worker messages are delivered to
    pub fn worker(&self) -> &Arc<ServiceWorker> {
        &self.worker
    }
}

impl MessageTarget for WorkerTarget {
    fn post_message(
        &self,
        message: Message,
        ports: Vec<MessagePort>,
        _delivery: Delivery,
    ) -> Result<(), MessagingError> {
        if self.worker.state().is_terminal() {
            return Err(MessagingError::Delivery(format!(
                "service worker {} is redundant",
                self.worker.id()
            )));
        }
        let mut event = MessageEvent::new(message);
        event.ports = ports;
        event.source = self.source.clone();
        event.origin = self.origin.clone();
        self.worker.scope().dispatch_message(event);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("service worker {}", self.worker.id())
    }
}

/// The page posting to itself.
///
/// Only broadcast delivery is accepted; messages whose target origin does
/// not match the page are dropped. The sender is always reported as the
/// page-context sentinel identity.
#[derive(Debug, Clone)]
pub struct WindowTarget {
    scope: GlobalScope,
}

impl WindowTarget {
    /// Target the page owning `scope`
    pub fn new(scope: GlobalScope) -> Self {
        Self { scope }
    }
}

impl MessageTarget for WindowTarget {
    fn post_message(
        &self,
        message: Message,
        ports: Vec<MessagePort>,
        delivery: Delivery,
    ) -> Result<(), MessagingError> {
        let Delivery::Broadcast { target_origin } = delivery else {
            return Err(MessagingError::Delivery(
                "posting to the own window requires a target origin".to_string(),
            ));
        };
        let origin = self
            .scope
            .origin()
            .map_err(|e| MessagingError::Delivery(e.to_string()))?;
        if target_origin != "*" {
            let matches = Origin::parse(&target_origin)
                .map(|target| target.is_same_origin(&origin))
                .unwrap_or(false);
            if !matches {
                tracing::debug!(%target_origin, "dropping message for another origin");
                return Ok(());
            }
        }

        let mut event = MessageEvent::new(message);
        event.ports = ports;
        event.source = Some(ClientId::legacy());
        event.origin = origin.serialize();
        self.scope.dispatch_message(event);
        Ok(())
    }

    fn is_same_context(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("window {}", self.scope.location())
    }
}
