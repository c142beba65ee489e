//! Context-wide event bus.
//!
//! Each execution context owns one bus for its whole lifetime. Native event
//! types are registered exactly once when the bus is created; listeners for
//! them are multiplexed through that single registration. Custom types are
//! added and removed freely.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listener handle returned by [`EventBus::on`]
pub type ListenerId = u64;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Event type keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A posted message
    Message,
    /// An intercepted request
    Fetch,
    /// Worker install
    Install,
    /// Worker activate
    Activate,
    /// The controlling worker of a page changed
    ControllerChange,
    /// The page is being torn down
    Unload,
    /// Application-defined event
    Custom(String),
}

impl EventType {
    /// All native event types
    pub fn native() -> [EventType; 6] {
        [
            EventType::Message,
            EventType::Fetch,
            EventType::Install,
            EventType::Activate,
            EventType::ControllerChange,
            EventType::Unload,
        ]
    }

    /// Whether the type is provided by the platform
    pub fn is_native(&self) -> bool {
        !matches!(self, EventType::Custom(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Message => write!(f, "message"),
            EventType::Fetch => write!(f, "fetch"),
            EventType::Install => write!(f, "install"),
            EventType::Activate => write!(f, "activate"),
            EventType::ControllerChange => write!(f, "controllerchange"),
            EventType::Unload => write!(f, "unload"),
            EventType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Events carried by an [`EventBus`]
pub trait BusEvent {
    /// The key listeners are registered under
    fn event_type(&self) -> EventType;
}

/// Listener multiplexer keyed by [`EventType`]
pub struct EventBus<E> {
    listeners: RwLock<HashMap<EventType, Vec<(ListenerId, Listener<E>)>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> EventBus<E> {
    /// Create a bus with every native type pre-registered
    pub fn new() -> Self {
        let listeners = EventType::native()
            .into_iter()
            .map(|ty| (ty, Vec::new()))
            .collect();
        Self {
            listeners: RwLock::new(listeners),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a listener
    pub fn on<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .write()
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, event_type: &EventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() && !event_type.is_native() {
            listeners.remove(event_type);
        }
        removed
    }

    /// Dispatch an event to its listeners in registration order, returning
    /// how many were invoked.
    ///
    /// Listeners are snapshotted first, so they may add or remove listeners
    /// while running.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = match self.listeners.read().get(&event.event_type()) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    /// Number of listeners for a type
    pub fn listener_count(&self, event_type: &EventType) -> usize {
        self.listeners
            .read()
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Whether the type currently has an entry on the bus
    pub fn is_registered(&self, event_type: &EventType) -> bool {
        self.listeners.read().contains_key(event_type)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("types", &self.listeners.read().len())
            .finish()
    }
}
