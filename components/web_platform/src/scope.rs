//! Global scope of a page or worker execution context.

use parking_lot::Mutex;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use url::Url;

use crate::window::WindowInner;
use crate::{Clients, FetchEvent, Origin, PlatformError, Transport, Window};
use messaging::{BusEvent, EventBus, EventType, ExecutionContext, ListenerId, MessageEvent};

/// Events delivered on a [`GlobalScope`]'s bus
#[derive(Debug)]
pub enum ScopeEvent {
    /// The worker is being installed
    Install,
    /// The worker is being activated
    Activate,
    /// A message posted to this context
    Message(MessageEvent),
    /// A request issued by a controlled page (or self-dispatched in a page)
    Fetch(Arc<FetchEvent>),
    /// The page is going away
    Unload,
    /// Application-defined event
    Custom {
        /// Event name
        name: String,
        /// Event payload
        detail: Value,
    },
}

impl BusEvent for ScopeEvent {
    fn event_type(&self) -> EventType {
        match self {
            ScopeEvent::Install => EventType::Install,
            ScopeEvent::Activate => EventType::Activate,
            ScopeEvent::Message(_) => EventType::Message,
            ScopeEvent::Fetch(_) => EventType::Fetch,
            ScopeEvent::Unload => EventType::Unload,
            ScopeEvent::Custom { name, .. } => EventType::Custom(name.clone()),
        }
    }
}

enum ScopeHost {
    Worker(Clients),
    Page(Weak<WindowInner>),
}

struct ScopeInner {
    context: ExecutionContext,
    location: Url,
    events: EventBus<ScopeEvent>,
    singletons: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    native_fetch: Arc<dyn Transport>,
    host: ScopeHost,
    incarnation: u64,
}

/// The global object of an execution context.
///
/// Cloning yields another handle to the same context. Everything attached
/// to a scope (listeners, singletons) lives exactly as long as the context.
#[derive(Clone)]
pub struct GlobalScope {
    inner: Arc<ScopeInner>,
}

/// Non-owning handle to a [`GlobalScope`]
#[derive(Clone)]
pub struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    /// Get the scope back if the context is still alive
    pub fn upgrade(&self) -> Option<GlobalScope> {
        self.inner.upgrade().map(|inner| GlobalScope { inner })
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakScope")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl GlobalScope {
    pub(crate) fn worker(
        location: Url,
        native_fetch: Arc<dyn Transport>,
        clients: Clients,
        incarnation: u64,
    ) -> Self {
        Self::with_host(
            ExecutionContext::Worker,
            location,
            native_fetch,
            ScopeHost::Worker(clients),
            incarnation,
        )
    }

    pub(crate) fn page(
        location: Url,
        native_fetch: Arc<dyn Transport>,
        window: Weak<WindowInner>,
    ) -> Self {
        Self::with_host(
            ExecutionContext::Page,
            location,
            native_fetch,
            ScopeHost::Page(window),
            0,
        )
    }

    fn with_host(
        context: ExecutionContext,
        location: Url,
        native_fetch: Arc<dyn Transport>,
        host: ScopeHost,
        incarnation: u64,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                context,
                location,
                events: EventBus::new(),
                singletons: Mutex::new(HashMap::new()),
                native_fetch,
                host,
                incarnation,
            }),
        }
    }

    /// Kind of context
    pub fn context(&self) -> ExecutionContext {
        self.inner.context
    }

    /// How many times the worker owning this scope was started again
    /// after being terminated; always 0 for pages
    pub fn incarnation(&self) -> u64 {
        self.inner.incarnation
    }

    /// URL of the page, or of the worker script
    pub fn location(&self) -> &Url {
        &self.inner.location
    }

    /// Origin of the context
    pub fn origin(&self) -> Result<Origin, PlatformError> {
        Origin::from_url(&self.inner.location)
    }

    /// The context's event bus
    pub fn events(&self) -> &EventBus<ScopeEvent> {
        &self.inner.events
    }

    /// Add a listener on the context's event bus
    pub fn on<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&ScopeEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(event_type, listener)
    }

    /// Remove a listener from the context's event bus
    pub fn off(&self, event_type: &EventType, id: ListenerId) -> bool {
        self.inner.events.off(event_type, id)
    }

    /// Dispatch an event synchronously, returning the number of listeners run
    pub fn dispatch(&self, event: &ScopeEvent) -> usize {
        self.inner.events.emit(event)
    }

    /// Queue a message event for delivery on the context's event loop
    pub fn dispatch_message(&self, event: MessageEvent) {
        let scope = self.clone();
        tokio::spawn(async move {
            let handled = scope.dispatch(&ScopeEvent::Message(event));
            tracing::trace!(context = %scope.context(), handled, "message delivered");
        });
    }

    /// The per-context instance of `T`, created by `init` on first use.
    ///
    /// `init` runs without any scope lock held, so it may itself request
    /// other singletons. If two callers race, the first stored value wins.
    pub fn singleton<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.lookup::<T>(key) {
            return existing;
        }
        let created: Arc<dyn Any + Send + Sync> = Arc::new(init());
        let stored = Arc::clone(self.inner.singletons.lock().entry(key).or_insert(created));
        match stored.downcast::<T>() {
            Ok(value) => value,
            Err(_) => unreachable!("singleton map is keyed by TypeId"),
        }
    }

    /// The per-context instance of `T`, if one was created
    pub fn try_singleton<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.lookup::<T>(TypeId::of::<T>())
    }

    fn lookup<T: Any + Send + Sync>(&self, key: TypeId) -> Option<Arc<T>> {
        let existing = self.inner.singletons.lock().get(&key).cloned()?;
        existing.downcast::<T>().ok()
    }

    /// The network capability as it was before any patching
    pub fn native_fetch(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.native_fetch)
    }

    /// The worker's clients; `None` in a page
    pub fn clients(&self) -> Option<&Clients> {
        match &self.inner.host {
            ScopeHost::Worker(clients) => Some(clients),
            ScopeHost::Page(_) => None,
        }
    }

    /// The page owning this scope; `None` in a worker or once the page is gone
    pub fn window(&self) -> Option<Window> {
        match &self.inner.host {
            ScopeHost::Page(window) => window.upgrade().map(Window::from_inner),
            ScopeHost::Worker(_) => None,
        }
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same context
    pub fn ptr_eq(&self, other: &GlobalScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("context", &self.inner.context)
            .field("location", &self.inner.location.as_str())
            .field("incarnation", &self.inner.incarnation)
            .finish()
    }
}
