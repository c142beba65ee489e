//! Server-side bookkeeping of connected pages.
//!
//! A page becomes connected when its `ping` reaches the server and stops
//! being connected when its `disconnect` does. Requests from pages that
//! are not connected are never routed. Entries are not health-checked, so
//! a page whose `disconnect` was lost stays listed.
//!
//! A worker that was terminated and started again evaluates its script in
//! a new scope, and with it gets a new registry. That registry starts out
//! with the pages the worker still controls, so connected pages keep being
//! served without having to ping again.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::ServerError;
use messaging::{Action, ClientId, ExecutionContext, Message, MessageEvent, MessageTarget};
use web_platform::{GlobalScope, WeakScope};

/// Identities of the pages connected to one server context
pub struct ClientRegistry {
    scope: WeakScope,
    context: ExecutionContext,
    /// In connection order
    ids: RwLock<Vec<ClientId>>,
}

impl ClientRegistry {
    /// The registry of `scope`
    pub fn for_scope(scope: &GlobalScope) -> Arc<ClientRegistry> {
        scope.singleton(|| ClientRegistry::new(scope))
    }

    /// Create a registry. A page context starts with its sentinel identity
    /// connected, a restarted worker with the pages it controls.
    pub fn new(scope: &GlobalScope) -> Self {
        let context = scope.context();
        let mut ids: Vec<ClientId> = context.sentinel_identity().into_iter().collect();
        if scope.incarnation() > 0 {
            ids.extend(controlled_pages(scope));
        }
        Self {
            scope: scope.downgrade(),
            context,
            ids: RwLock::new(ids),
        }
    }

    /// Kind of context the registry serves
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Whether `id` is connected
    pub fn has(&self, id: &ClientId) -> bool {
        self.ids.read().contains(id)
    }

    /// Connect `id`; returns `false` if it already was
    pub fn add(&self, id: ClientId) -> bool {
        let mut ids = self.ids.write();
        if ids.contains(&id) {
            return false;
        }
        tracing::debug!(client = %id, "client connected");
        ids.push(id);
        true
    }

    /// Disconnect `id`. The sentinel identity of a page context cannot be
    /// removed.
    pub fn delete(&self, id: &ClientId) -> bool {
        if self.context.sentinel_identity().as_ref() == Some(id) {
            return false;
        }
        let mut ids = self.ids.write();
        let before = ids.len();
        ids.retain(|known| known != id);
        let removed = ids.len() != before;
        if removed {
            tracing::debug!(client = %id, "client disconnected");
        }
        removed
    }

    /// Number of connected identities
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Whether nothing is connected
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// Connected identities in connection order
    pub fn ids(&self) -> Vec<ClientId> {
        self.ids.read().clone()
    }

    /// Handle a connection-management message. Returns whether the action
    /// was one this registry handles.
    pub fn on_message(&self, event: &MessageEvent) -> bool {
        match event.data.action {
            Action::Ping => {
                match self.resolve_source(event) {
                    Some(id) => {
                        self.add(id);
                    }
                    None => tracing::warn!("ping from a sender that could not be identified"),
                }
                self.reply(event, Message::new(Action::Pong));
                true
            }
            Action::RequestClaim => {
                let reply = match self.claim() {
                    Ok(claimed) => {
                        tracing::debug!(claimed, "clients claimed on request");
                        Message::new(Action::Established)
                    }
                    Err(message) => Message::failure(message),
                };
                self.reply(event, reply);
                true
            }
            Action::Disconnect => {
                if let Some(id) = self.resolve_source(event) {
                    self.delete(&id);
                }
                true
            }
            _ => false,
        }
    }

    fn claim(&self) -> Result<usize, String> {
        let scope = self
            .scope
            .upgrade()
            .ok_or_else(|| "context has been torn down".to_string())?;
        let clients = scope
            .clients()
            .ok_or_else(|| "clients can only be claimed from a worker".to_string())?;
        clients.claim().map_err(|e| e.to_string())
    }

    fn reply(&self, event: &MessageEvent, message: Message) {
        if let Err(err) = event.reply(message) {
            tracing::debug!(action = %event.data.action, error = %err, "reply not delivered");
        }
    }

    /// Sender of `event`. When the platform does not report it, the first
    /// in-scope page that is not connected yet is assumed to be the sender;
    /// two pages connecting at once may be mixed up.
    fn resolve_source(&self, event: &MessageEvent) -> Option<ClientId> {
        if let Some(source) = &event.source {
            return Some(source.clone());
        }
        let scope = self.scope.upgrade()?;
        let inferred = scope
            .clients()?
            .match_all()
            .into_iter()
            .map(|client| client.id().clone())
            .find(|id| !self.has(id))?;
        tracing::warn!(client = %inferred, action = %event.data.action, "message source not reported, inferred from unconnected clients");
        Some(inferred)
    }

    /// A connected page to send worker-initiated requests to
    pub fn get_available(&self) -> Result<Arc<dyn MessageTarget>, ServerError> {
        let scope = self.scope.upgrade().ok_or(ServerError::NoActiveClient)?;
        if let Some(sentinel) = self.context.sentinel_identity() {
            return match scope.window() {
                Some(window) if self.has(&sentinel) && !window.is_closed() => {
                    Ok(Arc::new(window.self_target()))
                }
                _ => Err(ServerError::NoActiveClient),
            };
        }
        let clients = scope.clients().ok_or(ServerError::NoActiveClient)?;
        self.ids()
            .iter()
            .find_map(|id| clients.get(id))
            .map(|client| Arc::new(client) as Arc<dyn MessageTarget>)
            .ok_or(ServerError::NoActiveClient)
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("context", &self.context)
            .field("ids", &self.ids())
            .finish()
    }
}

/// Pages controlled by the worker owning `scope`
fn controlled_pages(scope: &GlobalScope) -> Vec<ClientId> {
    let Some(clients) = scope.clients() else {
        return Vec::new();
    };
    let ids: Vec<ClientId> = clients
        .controlled()
        .into_iter()
        .map(|client| client.id().clone())
        .collect();
    tracing::info!(
        incarnation = scope.incarnation(),
        clients = ids.len(),
        "worker restarted, re-admitting controlled pages"
    );
    ids
}
