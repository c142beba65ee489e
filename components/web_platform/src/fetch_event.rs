//! Fetch events and their one-shot response capability.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::{GlobalScope, NetworkError, PlatformError, ScopeEvent};
use core_types::{Request, Response};
use messaging::ClientId;

/// A response that has been promised but may not be ready yet
pub type ResponseFuture = BoxFuture<'static, Result<Response, NetworkError>>;

/// An intercepted request waiting for a response decision
pub struct FetchEvent {
    request: Request,
    client_id: ClientId,
    responder: Mutex<Option<oneshot::Sender<ResponseFuture>>>,
}

impl FetchEvent {
    /// Create an event and the receiving end of its response
    pub fn new(request: Request, client_id: ClientId) -> (Arc<Self>, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        let event = Arc::new(Self {
            request,
            client_id,
            responder: Mutex::new(Some(tx)),
        });
        (event, ResponseReceiver { rx })
    }

    /// The intercepted request
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Identity of the context that issued the request
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Provide the response. Only the first call is accepted.
    pub fn respond_with<F>(&self, response: F) -> Result<(), PlatformError>
    where
        F: Future<Output = Result<Response, NetworkError>> + Send + 'static,
    {
        let sender = self
            .responder
            .lock()
            .take()
            .ok_or(PlatformError::AlreadyResponded)?;
        if sender.send(response.boxed()).is_err() {
            tracing::debug!(url = %self.request.url, "response arrived after the request fell through");
        }
        Ok(())
    }

    /// Provide a ready response
    pub fn respond(&self, response: Response) -> Result<(), PlatformError> {
        self.respond_with(futures::future::ready(Ok(response)))
    }

    /// Whether `respond_with` has been called
    pub fn was_responded(&self) -> bool {
        self.responder.lock().is_none()
    }
}

impl fmt::Debug for FetchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEvent")
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .field("client_id", &self.client_id)
            .field("responded", &self.was_responded())
            .finish()
    }
}

/// Receiving end of a [`FetchEvent`]'s response
pub struct ResponseReceiver {
    rx: oneshot::Receiver<ResponseFuture>,
}

impl fmt::Debug for ResponseReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseReceiver").finish_non_exhaustive()
    }
}

impl ResponseReceiver {
    /// Wait for a response decision.
    ///
    /// A zero `grace` only accepts a response given during the dispatch
    /// itself. Returns `None` when nobody responded, or the event was
    /// dropped unanswered.
    pub async fn wait(mut self, grace: Duration) -> Option<ResponseFuture> {
        if grace.is_zero() {
            return self.rx.try_recv().ok();
        }
        match tokio::time::timeout(grace, self.rx).await {
            Ok(Ok(response)) => Some(response),
            _ => None,
        }
    }
}

/// Dispatch a fetch event on `scope` and wait up to `grace` for a response
pub async fn dispatch_fetch(
    scope: &GlobalScope,
    request: Request,
    client_id: ClientId,
    grace: Duration,
) -> Option<ResponseFuture> {
    let (event, receiver) = FetchEvent::new(request, client_id);
    let listeners = scope.dispatch(&ScopeEvent::Fetch(Arc::clone(&event)));
    tracing::trace!(url = %event.request().url, listeners, "fetch event dispatched");
    drop(event);
    receiver.wait(grace).await
}
