//! The page side of a connection.
//!
//! A [`Client`] connects a page to the server running its routes. Where
//! service workers are usable it registers the server script as a worker,
//! waits for activation and performs the handshake:
//!
//! 1. if the page is not controlled yet, `request_claim`, answered by
//!    `established` once the worker has claimed the page;
//! 2. `ping`, answered by `pong` once the server has recorded the page.
//!
//! Otherwise the client runs in legacy mode: it patches the page's `fetch`
//! and `XMLHttpRequest`, evaluates the server script in the page itself and
//! pings it there.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::storage::serve_storage;
use crate::{ClientError, ClientOptions};
use interceptor::{FetchInterceptOptions, FetchInterceptor, XhrInterceptor};
use messaging::{post, send_request, Action, EventType, Message, MessageTarget};
use web_platform::{
    ContainerEvent, ScopeEvent, ServiceWorker, ServiceWorkerRegistration, ServiceWorkerState,
    Window,
};

// ============================================================================
// Connection state
// ============================================================================

/// Where a client is in its connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connecting, or disconnected by `unregister`
    Uninitialized,
    /// Registering the worker, or loading the script in legacy mode
    Registering,
    /// Exchanging claim / ping messages
    Handshaking,
    /// Requests are being intercepted
    Ready,
    /// Handshaking again after a controller change
    Reconnecting,
    /// Connecting failed
    Failed(String),
}

impl ConnectionState {
    /// Whether the client is connected
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Whether no connection attempt is in progress
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ConnectionState::Ready | ConnectionState::Failed(_) | ConnectionState::Uninitialized
        )
    }
}

// ============================================================================
// Client
// ============================================================================

/// Callback run after every reconnection attempt
pub type ControllerCallback =
    Arc<dyn Fn(Result<ServiceWorkerRegistration, ClientError>) + Send + Sync>;

struct LegacyPatches {
    fetch: FetchInterceptor,
    xhr: XhrInterceptor,
}

struct ClientInner {
    window: Window,
    script_url: String,
    options: ClientOptions,
    legacy: bool,
    state: watch::Sender<ConnectionState>,
    registration: RwLock<Option<ServiceWorkerRegistration>>,
    /// Worker the last successful handshake talked to
    connected_worker: Mutex<Option<u64>>,
    subscribers: Mutex<Vec<ControllerCallback>>,
    patches: Mutex<Option<LegacyPatches>>,
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        tracing::trace!(window = %self.window.id(), state = ?state, "client state");
        self.state.send_replace(state);
    }
}

/// Connection from a page to its mock server
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    fn new(window: &Window, script_url: &str, options: ClientOptions) -> Self {
        let legacy = if options.force_legacy {
            tracing::info!(window = %window.id(), "legacy mode forced");
            true
        } else if !window.container().is_supported() {
            tracing::warn!(
                window = %window.id(),
                secure = window.is_secure_context(),
                "service workers unavailable, falling back to legacy mode"
            );
            true
        } else {
            false
        };

        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        let client = Self {
            inner: Arc::new(ClientInner {
                window: window.clone(),
                script_url: script_url.to_string(),
                options,
                legacy,
                state,
                registration: RwLock::new(None),
                connected_worker: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                patches: Mutex::new(None),
            }),
        };
        client.install_listeners();
        client
    }

    fn install_listeners(&self) {
        let window = &self.inner.window;
        let store = window.storage();

        if self.inner.legacy {
            window.scope().on(EventType::Message, move |event| {
                if let ScopeEvent::Message(message) = event {
                    serve_storage(Arc::clone(&store), message);
                }
            });
        } else {
            window.container().on(EventType::Message, move |event| {
                if let ContainerEvent::Message(message) = event {
                    serve_storage(Arc::clone(&store), message);
                }
            });
            let weak = Arc::downgrade(&self.inner);
            window
                .container()
                .on(EventType::ControllerChange, move |_| {
                    if let Some(client) = upgrade(&weak) {
                        client.controller_changed();
                    }
                });
        }

        let weak = Arc::downgrade(&self.inner);
        window.scope().on(EventType::Unload, move |_| {
            if let Some(client) = upgrade(&weak) {
                client.disconnect();
            }
        });
    }

    /// Run the connection attempt to completion
    async fn connect(&self) {
        let outcome = if self.inner.legacy {
            self.connect_legacy().await
        } else {
            self.connect_worker().await
        };
        match outcome {
            Ok(()) => {
                tracing::info!(
                    window = %self.inner.window.id(),
                    legacy = self.inner.legacy,
                    "mock client connected"
                );
                self.inner.set_state(ConnectionState::Ready);
            }
            Err(err) => {
                tracing::error!(window = %self.inner.window.id(), error = %err, "mock client failed to connect");
                if self.inner.legacy {
                    self.restore_patches();
                }
                self.inner.set_state(ConnectionState::Failed(err.to_string()));
            }
        }
    }

    async fn connect_worker(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.set_state(ConnectionState::Registering);
        let registration = inner
            .window
            .container()
            .register(&inner.script_url, inner.options.registration())?;
        *inner.registration.write() = Some(registration.clone());

        let worker = registration
            .newest_worker()
            .ok_or_else(|| ClientError::NoWorker(registration.scope().to_string()))?;
        tracing::debug!(worker = worker.id(), "waiting for service worker activation");
        worker.wait_for(ServiceWorkerState::Activated).await?;

        inner.set_state(ConnectionState::Handshaking);
        self.handshake(&registration).await
    }

    async fn handshake(&self, registration: &ServiceWorkerRegistration) -> Result<(), ClientError> {
        let window = &self.inner.window;
        let timeout = self.inner.options.timeout();

        if window.controller().is_none() {
            let active = registration
                .active()
                .ok_or_else(|| ClientError::NoWorker(registration.scope().to_string()))?;
            tracing::debug!(worker = active.id(), "requesting claim");
            let reply = send_request(
                &window.worker_target(active),
                Message::new(Action::RequestClaim),
                timeout,
            )
            .await?;
            expect_reply(Action::RequestClaim, Action::Established, &reply)?;
        }

        let target = window
            .controller_target()
            .ok_or(ClientError::ControllerRemoved)?;
        tracing::debug!(worker = target.worker().id(), "pinging server");
        let reply = send_request(&target, Message::new(Action::Ping), timeout).await?;
        expect_reply(Action::Ping, Action::Pong, &reply)?;
        *self.inner.connected_worker.lock() = Some(target.worker().id());
        Ok(())
    }

    async fn connect_legacy(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let window = &inner.window;
        inner.set_state(ConnectionState::Registering);

        let fetch = FetchInterceptor::install(window, FetchInterceptOptions::default())?;
        let xhr = match XhrInterceptor::install(window, FetchInterceptOptions::default()) {
            Ok(xhr) => xhr,
            Err(err) => {
                if let Err(restore) = fetch.uninstall() {
                    tracing::warn!(error = %restore, "could not restore fetch");
                }
                return Err(err.into());
            }
        };
        *inner.patches.lock() = Some(LegacyPatches { fetch, xhr });
        window.load_script(&inner.script_url)?;

        inner.set_state(ConnectionState::Handshaking);
        let reply = send_request(
            &window.self_target(),
            Message::new(Action::Ping),
            inner.options.timeout(),
        )
        .await?;
        expect_reply(Action::Ping, Action::Pong, &reply)
    }

    fn restore_patches(&self) {
        let Some(patches) = self.inner.patches.lock().take() else {
            return;
        };
        for result in [patches.fetch.uninstall(), patches.xhr.uninstall()] {
            if let Err(err) = result {
                tracing::warn!(window = %self.inner.window.id(), error = %err, "could not restore page patch");
            }
        }
    }

    /// Called synchronously from `controllerchange`
    fn controller_changed(&self) {
        let state = self.state();
        if !matches!(state, ConnectionState::Ready | ConnectionState::Reconnecting) {
            return;
        }
        let controller = self.inner.window.controller().map(|c| c.id());
        if controller.is_some() && controller == *self.inner.connected_worker.lock() {
            return;
        }
        tracing::debug!(window = %self.inner.window.id(), controller = ?controller, "controller changed, reconnecting");
        self.inner.set_state(ConnectionState::Reconnecting);
        let client = self.clone();
        tokio::spawn(async move {
            client.reconnect().await;
        });
    }

    async fn reconnect(&self) {
        let outcome = self.rehandshake().await;
        match &outcome {
            Ok(_) => {
                tracing::info!(window = %self.inner.window.id(), "mock client reconnected");
                self.inner.set_state(ConnectionState::Ready);
            }
            Err(err) => {
                tracing::error!(window = %self.inner.window.id(), error = %err, "reconnection failed");
                self.inner.set_state(ConnectionState::Failed(err.to_string()));
            }
        }
        let subscribers: Vec<ControllerCallback> = self.inner.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber(outcome.clone());
        }
    }

    async fn rehandshake(&self) -> Result<ServiceWorkerRegistration, ClientError> {
        if self.inner.window.controller().is_none() {
            return Err(ClientError::ControllerRemoved);
        }
        let registration = self
            .inner
            .window
            .container()
            .get_registration(None)
            .ok_or(ClientError::ControllerRemoved)?;
        *self.inner.registration.write() = Some(registration.clone());
        self.handshake(&registration).await?;
        Ok(registration)
    }

    /// Wait until connecting settles.
    ///
    /// Resolves with the registration once connected; legacy mode and
    /// failed connections resolve with `None` (see [`Client::state`]).
    pub async fn ready(&self) -> Option<ServiceWorkerRegistration> {
        let mut rx = self.inner.state.subscribe();
        let settled = rx
            .wait_for(ConnectionState::is_settled)
            .await
            .ok()?
            .clone();
        match settled {
            ConnectionState::Ready => self.registration(),
            _ => None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Whether the server runs in the page itself
    pub fn is_legacy(&self) -> bool {
        self.inner.legacy
    }

    /// The page this client belongs to
    pub fn window(&self) -> &Window {
        &self.inner.window
    }

    /// The worker serving this page; always `None` in legacy mode
    pub fn controller(&self) -> Option<Arc<ServiceWorker>> {
        if self.inner.legacy {
            return None;
        }
        self.inner.window.controller()
    }

    /// Registration obtained while connecting
    pub fn registration(&self) -> Option<ServiceWorkerRegistration> {
        self.inner.registration.read().clone()
    }

    /// The registration controlling this page
    pub fn get_registration(&self) -> Option<ServiceWorkerRegistration> {
        if self.inner.legacy {
            return None;
        }
        self.inner.window.container().get_registration(None)
    }

    /// Check for a new server script.
    ///
    /// A newly found worker is awaited until activated. Legacy mode has
    /// nothing to update and resolves with `None`.
    pub async fn update(&self) -> Result<Option<ServiceWorkerRegistration>, ClientError> {
        if self.inner.legacy {
            return Ok(None);
        }
        let registration = self
            .registration()
            .ok_or_else(|| ClientError::NotConnected(format!("{:?}", self.state())))?;
        if let Some(worker) = registration.update()? {
            tracing::debug!(worker = worker.id(), "update found a new service worker");
            worker.wait_for(ServiceWorkerState::Activated).await?;
        }
        Ok(Some(registration))
    }

    /// Stop intercepting.
    ///
    /// Unregisters the worker, or removes the page patches in legacy mode.
    /// Fails with [`ClientError::ControllerRemoved`] when the page lost its
    /// controller some other way.
    pub async fn unregister(&self) -> Result<bool, ClientError> {
        if self.inner.legacy {
            self.restore_patches();
            self.inner.set_state(ConnectionState::Uninitialized);
            return Ok(true);
        }
        if self.inner.window.controller().is_none() {
            return Err(ClientError::ControllerRemoved);
        }
        let registration = self
            .registration()
            .or_else(|| self.get_registration())
            .ok_or(ClientError::ControllerRemoved)?;

        let previous = self.inner.state.send_replace(ConnectionState::Uninitialized);
        let removed = registration.unregister();
        if removed {
            *self.inner.connected_worker.lock() = None;
            tracing::info!(window = %self.inner.window.id(), "mock client unregistered");
        } else {
            self.inner.set_state(previous);
        }
        Ok(removed)
    }

    fn server_target(&self) -> Result<Arc<dyn MessageTarget>, ClientError> {
        if self.inner.legacy {
            return Ok(Arc::new(self.inner.window.self_target()));
        }
        let target = self
            .inner
            .window
            .controller_target()
            .ok_or(ClientError::ControllerRemoved)?;
        Ok(Arc::new(target))
    }

    /// Send `message` to the server and wait for its reply
    pub async fn send_message(&self, message: Message) -> Result<Message, ClientError> {
        let target = self.server_target()?;
        Ok(send_request(target.as_ref(), message, self.inner.options.timeout()).await?)
    }

    /// Tell the server this page is going away.
    ///
    /// Does not wait for, or learn about, delivery.
    pub fn disconnect(&self) {
        let posted = self
            .server_target()
            .and_then(|target| {
                post(target.as_ref(), Message::new(Action::Disconnect)).map_err(ClientError::from)
            });
        if let Err(err) = posted {
            tracing::debug!(window = %self.inner.window.id(), error = %err, "disconnect not sent");
        }
    }

    /// Run `callback` after each reconnection that follows a controller
    /// change, with the registration or the reason it failed
    pub fn on_controller_change<F>(&self, callback: F)
    where
        F: Fn(Result<ServiceWorkerRegistration, ClientError>) + Send + Sync + 'static,
    {
        self.inner.subscribers.lock().push(Arc::new(callback));
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("window", self.inner.window.id())
            .field("script_url", &self.inner.script_url)
            .field("legacy", &self.inner.legacy)
            .field("state", &self.state())
            .finish()
    }
}

fn upgrade(weak: &Weak<ClientInner>) -> Option<Client> {
    weak.upgrade().map(|inner| Client { inner })
}

fn expect_reply(request: Action, expected: Action, reply: &Message) -> Result<(), ClientError> {
    if reply.action == expected {
        return Ok(());
    }
    Err(ClientError::Protocol {
        request,
        expected,
        actual: reply.action.clone(),
    })
}

/// Connect `window` to the server script at `script_url`.
///
/// Connecting continues in the background; await [`Client::ready`] before
/// relying on interception. Must be called within a tokio runtime.
pub fn create_client(window: &Window, script_url: &str, options: ClientOptions) -> Client {
    let client = Client::new(window, script_url, options);
    client.inner.set_state(ConnectionState::Registering);
    let connecting = client.clone();
    tokio::spawn(async move {
        connecting.connect().await;
    });
    client
}
