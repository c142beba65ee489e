//! Service worker container, registrations and worker lifecycle.
//!
//! A registration owns up to three workers (installing, waiting, active).
//! Registering evaluates the worker script immediately in a fresh worker
//! [`GlobalScope`]; `install` and `activate` are then dispatched on the
//! runtime and the worker is promoted. Pages controlled by a replaced
//! worker are handed over to its successor and see a `controllerchange`.
//!
//! An active worker may be terminated while idle, as browsers do. The next
//! event addressed to it starts it again: the script is evaluated in a
//! fresh global scope, so everything the previous scope held is gone, while
//! the worker keeps its identity, its state and the pages it controls.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use url::Url;

use crate::browser::BrowserInner;
use crate::window::WindowInner;
use crate::{
    Browser, Clients, GlobalScope, Origin, PlatformError, ScopeEvent, Transport, Window, WorkerScript,
};
use messaging::{BusEvent, EventBus, EventType, ListenerId, MessageEvent};

// ============================================================================
// Service Worker State
// ============================================================================

/// Service Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Script evaluated, not yet installing
    Parsed,
    /// Worker is installing (install event dispatched)
    Installing,
    /// Worker installed successfully, waiting to activate
    Installed,
    /// Worker is activating (activate event dispatched)
    Activating,
    /// Worker is active and may control pages
    Activated,
    /// Worker has been replaced or unregistered
    Redundant,
}

impl ServiceWorkerState {
    /// Check if this state allows fetch interception
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ServiceWorkerState::Activated)
    }

    /// Check if the worker is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceWorkerState::Redundant)
    }
}

impl fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceWorkerState::Parsed => write!(f, "parsed"),
            ServiceWorkerState::Installing => write!(f, "installing"),
            ServiceWorkerState::Installed => write!(f, "installed"),
            ServiceWorkerState::Activating => write!(f, "activating"),
            ServiceWorkerState::Activated => write!(f, "activated"),
            ServiceWorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

// ============================================================================
// Service Worker
// ============================================================================

type StateListener = Arc<dyn Fn(ServiceWorkerState) + Send + Sync>;

/// Everything needed to evaluate a worker's script in a new global scope
struct Launcher {
    script: WorkerScript,
    native_fetch: Arc<dyn Transport>,
    clients: Clients,
}

impl Launcher {
    fn launch(&self, location: &Url, incarnation: u64) -> GlobalScope {
        let scope = GlobalScope::worker(
            location.clone(),
            Arc::clone(&self.native_fetch),
            self.clients.clone(),
            incarnation,
        );
        (self.script)(&scope);
        scope
    }
}

/// A service worker instance
pub struct ServiceWorker {
    id: u64,
    script_url: Url,
    version: u64,
    scope: RwLock<GlobalScope>,
    launcher: Launcher,
    running: AtomicBool,
    /// Held while the script is evaluated again
    restarting: Mutex<()>,
    state: watch::Sender<ServiceWorkerState>,
    state_listeners: Mutex<Vec<StateListener>>,
}

impl ServiceWorker {
    fn new(script_url: Url, version: u64, scope: GlobalScope, launcher: Launcher) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let (state, _) = watch::channel(ServiceWorkerState::Parsed);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            script_url,
            version,
            scope: RwLock::new(scope),
            launcher,
            running: AtomicBool::new(true),
            restarting: Mutex::new(()),
            state,
            state_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Get the worker's unique ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the script URL
    pub fn script_url(&self) -> &Url {
        &self.script_url
    }

    /// Version of the script this worker was evaluated from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The worker's global scope.
    ///
    /// A terminated worker is started again first, so events delivered
    /// through the returned scope reach a freshly evaluated script.
    pub fn scope(&self) -> GlobalScope {
        if self.is_running() || self.state().is_terminal() {
            return self.scope.read().clone();
        }
        let _restarting = self.restarting.lock();
        if self.is_running() {
            return self.scope.read().clone();
        }
        let incarnation = self.scope.read().incarnation() + 1;
        tracing::debug!(worker = self.id, incarnation, "evaluating worker script again");
        let scope = self.launcher.launch(&self.script_url, incarnation);
        *self.scope.write() = scope.clone();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(worker = self.id, incarnation, "service worker restarted");
        scope
    }

    /// Whether the worker's global scope is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Terminate an idle worker.
    ///
    /// The worker stays installed and keeps controlling its pages; its
    /// global scope is discarded the next time the worker is started.
    /// Returns `false` if the worker was not running or is redundant.
    pub fn terminate(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        let _restarting = self.restarting.lock();
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            tracing::info!(worker = self.id, "service worker terminated");
        }
        was_running
    }

    /// Get the current state
    pub fn state(&self) -> ServiceWorkerState {
        *self.state.borrow()
    }

    /// Transition to a new state. A redundant worker never leaves that state.
    pub(crate) fn set_state(&self, new_state: ServiceWorkerState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == new_state || state.is_terminal() {
                return false;
            }
            *state = new_state;
            true
        });
        if changed {
            tracing::debug!(worker = self.id, state = %new_state, "service worker state changed");
            let listeners: Vec<StateListener> = self.state_listeners.lock().clone();
            for listener in listeners {
                listener(new_state);
            }
        }
    }

    /// Register a state change listener
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(ServiceWorkerState) + Send + Sync + 'static,
    {
        self.state_listeners.lock().push(Arc::new(callback));
    }

    /// Wait until the worker reaches `target`.
    ///
    /// Fails if the worker becomes redundant first.
    pub async fn wait_for(&self, target: ServiceWorkerState) -> Result<(), PlatformError> {
        let mut rx = self.state.subscribe();
        let reached = *rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map_err(|_| PlatformError::InvalidState {
                expected: target.to_string(),
                actual: ServiceWorkerState::Redundant,
            })?;
        if reached == target {
            Ok(())
        } else {
            Err(PlatformError::InvalidState {
                expected: target.to_string(),
                actual: reached,
            })
        }
    }
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("script_url", &self.script_url.as_str())
            .field("version", &self.version)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Service Worker Registration
// ============================================================================

/// Registration options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationOptions {
    /// Scope URL for the registration, defaults to the script's directory
    pub scope: Option<String>,
    /// Update via cache mode
    pub update_via_cache: UpdateViaCache,
}

impl RegistrationOptions {
    /// Options with an explicit scope
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }
}

/// Update via cache modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateViaCache {
    /// Check cache for imports only
    #[default]
    Imports,
    /// Check cache for main script and imports
    All,
    /// Never check cache
    None,
}

pub(crate) struct RegistrationInner {
    id: u64,
    scope: Url,
    script_url: RwLock<Url>,
    update_via_cache: UpdateViaCache,
    browser: Weak<BrowserInner>,
    installing: RwLock<Option<Arc<ServiceWorker>>>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
    active: RwLock<Option<Arc<ServiceWorker>>>,
    unregistered: AtomicBool,
}

/// A service worker registration
#[derive(Clone)]
pub struct ServiceWorkerRegistration {
    inner: Arc<RegistrationInner>,
}

impl ServiceWorkerRegistration {
    fn new(browser: &Browser, scope: Url, script_url: Url, update_via_cache: UpdateViaCache) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(RegistrationInner {
                id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
                scope,
                script_url: RwLock::new(script_url),
                update_via_cache,
                browser: browser.downgrade(),
                installing: RwLock::new(None),
                waiting: RwLock::new(None),
                active: RwLock::new(None),
                unregistered: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistrationInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistrationInner> {
        Arc::downgrade(&self.inner)
    }

    /// Get the registration ID
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the scope URL
    pub fn scope(&self) -> &str {
        self.inner.scope.as_str()
    }

    /// URL of the script the registration was made with
    pub fn script_url(&self) -> Url {
        self.inner.script_url.read().clone()
    }

    /// Get the installing worker
    pub fn installing(&self) -> Option<Arc<ServiceWorker>> {
        self.inner.installing.read().clone()
    }

    /// Get the waiting worker
    pub fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.inner.waiting.read().clone()
    }

    /// Get the active worker
    pub fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.inner.active.read().clone()
    }

    /// The most recent worker: installing, else waiting, else active
    pub fn newest_worker(&self) -> Option<Arc<ServiceWorker>> {
        self.installing()
            .or_else(|| self.waiting())
            .or_else(|| self.active())
    }

    /// Get the update via cache mode
    pub fn update_via_cache(&self) -> UpdateViaCache {
        self.inner.update_via_cache
    }

    /// Whether `url` falls under this registration's scope
    pub fn covers(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.inner.scope.as_str())
    }

    /// Whether the registration has been removed
    pub fn is_unregistered(&self) -> bool {
        self.inner.unregistered.load(Ordering::SeqCst)
    }

    fn browser(&self) -> Result<Browser, PlatformError> {
        self.inner
            .browser
            .upgrade()
            .map(Browser::from_inner)
            .ok_or_else(|| PlatformError::RegistrationNotFound(self.scope().to_string()))
    }

    /// Check the script for a new version.
    ///
    /// Returns the newly installing worker, or `None` when the newest worker
    /// already runs the current script.
    pub fn update(&self) -> Result<Option<Arc<ServiceWorker>>, PlatformError> {
        if self.is_unregistered() {
            return Err(PlatformError::RegistrationNotFound(self.scope().to_string()));
        }
        let browser = self.browser()?;
        let script_url = self.script_url();
        let (_, version) = browser
            .scripts()
            .resolve(&script_url)
            .ok_or_else(|| PlatformError::ScriptNotFound(script_url.to_string()))?;
        match self.newest_worker() {
            Some(newest) if newest.version() == version => {
                tracing::debug!(scope = %self.scope(), version, "service worker is up to date");
                Ok(None)
            }
            _ => install_worker(&browser, self, script_url).map(Some),
        }
    }

    /// Unregister: every worker becomes redundant and controlled pages are
    /// released. Returns `false` if already unregistered.
    pub fn unregister(&self) -> bool {
        if self.inner.unregistered.swap(true, Ordering::SeqCst) {
            return false;
        }
        let workers: Vec<Arc<ServiceWorker>> = [
            self.inner.installing.write().take(),
            self.inner.waiting.write().take(),
            self.inner.active.write().take(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if let Ok(browser) = self.browser() {
            browser.remove_registration(self.id());
            for window in browser.windows() {
                let controlled = window
                    .controller()
                    .map(|c| workers.iter().any(|w| w.id() == c.id()))
                    .unwrap_or(false);
                if controlled {
                    window.container().set_controller(None);
                }
            }
        }
        for worker in &workers {
            worker.set_state(ServiceWorkerState::Redundant);
        }
        tracing::info!(scope = %self.scope(), "service worker unregistered");
        true
    }

    fn start_install(&self, worker: Arc<ServiceWorker>) {
        worker.set_state(ServiceWorkerState::Installing);
        if let Some(previous) = self.inner.installing.write().replace(worker) {
            previous.set_state(ServiceWorkerState::Redundant);
        }
    }

    fn complete_install(&self, worker: &Arc<ServiceWorker>) -> bool {
        let mut installing = self.inner.installing.write();
        if !installing.as_ref().is_some_and(|w| w.id() == worker.id()) {
            return false;
        }
        installing.take();
        drop(installing);
        worker.set_state(ServiceWorkerState::Installed);
        if let Some(previous) = self.inner.waiting.write().replace(Arc::clone(worker)) {
            previous.set_state(ServiceWorkerState::Redundant);
        }
        true
    }

    /// Promote the waiting worker; returns the worker it replaced
    fn start_activate(&self, worker: &Arc<ServiceWorker>) -> Option<Option<Arc<ServiceWorker>>> {
        let mut waiting = self.inner.waiting.write();
        if !waiting.as_ref().is_some_and(|w| w.id() == worker.id()) {
            return None;
        }
        waiting.take();
        drop(waiting);
        worker.set_state(ServiceWorkerState::Activating);
        let previous = self.inner.active.write().replace(Arc::clone(worker));
        Some(previous)
    }
}

impl fmt::Debug for ServiceWorkerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorkerRegistration")
            .field("id", &self.inner.id)
            .field("scope", &self.scope())
            .field("installing", &self.installing())
            .field("waiting", &self.waiting())
            .field("active", &self.active())
            .finish()
    }
}

/// Evaluate the script at `script_url` in a new worker and run its
/// lifecycle on the runtime.
fn install_worker(
    browser: &Browser,
    registration: &ServiceWorkerRegistration,
    script_url: Url,
) -> Result<Arc<ServiceWorker>, PlatformError> {
    let (script, version) = browser
        .scripts()
        .resolve(&script_url)
        .ok_or_else(|| PlatformError::ScriptNotFound(script_url.to_string()))?;

    let launcher = Launcher {
        script,
        native_fetch: browser.network(),
        clients: Clients::new(registration.downgrade(), browser.downgrade()),
    };
    tracing::debug!(script = %script_url, version, "evaluating worker script");
    let scope = launcher.launch(&script_url, 0);
    let worker = Arc::new(ServiceWorker::new(script_url, version, scope, launcher));
    *registration.inner.script_url.write() = worker.script_url().clone();
    registration.start_install(Arc::clone(&worker));

    let browser = browser.clone();
    let registration = registration.clone();
    let installing = Arc::clone(&worker);
    tokio::spawn(async move {
        run_lifecycle(browser, registration, installing).await;
    });
    Ok(worker)
}

async fn run_lifecycle(browser: Browser, registration: ServiceWorkerRegistration, worker: Arc<ServiceWorker>) {
    worker.scope().dispatch(&ScopeEvent::Install);
    if registration.is_unregistered() || !registration.complete_install(&worker) {
        worker.set_state(ServiceWorkerState::Redundant);
        return;
    }

    tokio::task::yield_now().await;

    let Some(previous) = registration.start_activate(&worker) else {
        worker.set_state(ServiceWorkerState::Redundant);
        return;
    };
    worker.scope().dispatch(&ScopeEvent::Activate);

    if let Some(previous) = &previous {
        for window in browser.windows() {
            if window.controller().is_some_and(|c| c.id() == previous.id()) {
                window.container().set_controller(Some(Arc::clone(&worker)));
            }
        }
    }
    worker.set_state(ServiceWorkerState::Activated);
    if let Some(previous) = previous {
        previous.set_state(ServiceWorkerState::Redundant);
    }
    tracing::info!(worker = worker.id(), scope = %registration.scope(), "service worker activated");
}

// ============================================================================
// Service Worker Container (navigator.serviceWorker)
// ============================================================================

/// Events delivered on a [`ServiceWorkerContainer`]
#[derive(Debug)]
pub enum ContainerEvent {
    /// The page's controller changed
    ControllerChange,
    /// A worker posted a message to the page
    Message(MessageEvent),
}

impl BusEvent for ContainerEvent {
    fn event_type(&self) -> EventType {
        match self {
            ContainerEvent::ControllerChange => EventType::ControllerChange,
            ContainerEvent::Message(_) => EventType::Message,
        }
    }
}

/// Per-page entry point to service workers
pub struct ServiceWorkerContainer {
    window: Weak<WindowInner>,
    browser: Weak<BrowserInner>,
    controller: RwLock<Option<Arc<ServiceWorker>>>,
    events: Arc<EventBus<ContainerEvent>>,
}

impl ServiceWorkerContainer {
    pub(crate) fn new(window: Weak<WindowInner>, browser: Weak<BrowserInner>) -> Self {
        Self {
            window,
            browser,
            controller: RwLock::new(None),
            events: Arc::new(EventBus::new()),
        }
    }

    fn window(&self) -> Result<Window, PlatformError> {
        self.window
            .upgrade()
            .map(Window::from_inner)
            .ok_or_else(|| PlatformError::WindowClosed("<dropped>".to_string()))
    }

    fn browser(&self) -> Result<Browser, PlatformError> {
        self.browser
            .upgrade()
            .map(Browser::from_inner)
            .ok_or(PlatformError::Unsupported)
    }

    /// Whether service workers can be used from this page
    pub fn is_supported(&self) -> bool {
        let enabled = self
            .browser()
            .map(|b| b.config().service_workers)
            .unwrap_or(false);
        enabled && self.window().map(|w| w.is_secure_context()).unwrap_or(false)
    }

    /// The worker controlling this page
    pub fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.controller.read().clone()
    }

    /// Replace the controller, firing `controllerchange` if it changed
    pub(crate) fn set_controller(&self, worker: Option<Arc<ServiceWorker>>) {
        if self.adopt_controller(worker) {
            self.events.emit(&ContainerEvent::ControllerChange);
        }
    }

    /// Replace the controller without firing events; returns whether it changed
    pub(crate) fn adopt_controller(&self, worker: Option<Arc<ServiceWorker>>) -> bool {
        let mut controller = self.controller.write();
        let same = match (controller.as_ref(), worker.as_ref()) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };
        if !same {
            *controller = worker;
        }
        !same
    }

    /// Register a worker script.
    ///
    /// Resolves as soon as the script has been evaluated; installation and
    /// activation continue on the runtime. Registering the same script again
    /// returns the existing registration. Must be called within a tokio
    /// runtime.
    pub fn register(
        &self,
        script_url: &str,
        options: RegistrationOptions,
    ) -> Result<ServiceWorkerRegistration, PlatformError> {
        let browser = self.browser()?;
        let window = self.window()?;
        if !browser.config().service_workers {
            return Err(PlatformError::Unsupported);
        }
        if !window.is_secure_context() {
            return Err(PlatformError::Security(format!(
                "service workers require a secure context, {} is not",
                window.origin()
            )));
        }

        let script_url = window.url().join(script_url)?;
        if !Origin::from_url(&script_url)?.is_same_origin(window.origin()) {
            return Err(PlatformError::Security(format!(
                "script {} is not same-origin with {}",
                script_url,
                window.origin()
            )));
        }
        let scope = match options.scope.as_deref() {
            Some(scope) => window.url().join(scope)?,
            None => script_url.join("./")?,
        };

        if let Some(existing) = browser.registration_for_scope(&scope) {
            let current = browser.scripts().resolve(&script_url).map(|(_, v)| v);
            let up_to_date = existing
                .newest_worker()
                .is_some_and(|w| *w.script_url() == script_url && Some(w.version()) == current);
            if up_to_date {
                return Ok(existing);
            }
            install_worker(&browser, &existing, script_url)?;
            return Ok(existing);
        }

        let registration =
            ServiceWorkerRegistration::new(&browser, scope, script_url.clone(), options.update_via_cache);
        install_worker(&browser, &registration, script_url)?;
        browser.add_registration(registration.clone());
        tracing::info!(scope = %registration.scope(), "service worker registered");
        Ok(registration)
    }

    /// The registration controlling `client_url` (default: this page)
    pub fn get_registration(&self, client_url: Option<&str>) -> Option<ServiceWorkerRegistration> {
        let browser = self.browser().ok()?;
        let window = self.window().ok()?;
        let url = match client_url {
            Some(url) => window.url().join(url).ok()?,
            None => window.url().clone(),
        };
        browser.match_registration(&url)
    }

    /// All registrations of this page's origin
    pub fn get_registrations(&self) -> Vec<ServiceWorkerRegistration> {
        let (Ok(browser), Ok(window)) = (self.browser(), self.window()) else {
            return Vec::new();
        };
        browser
            .registrations()
            .into_iter()
            .filter(|r| {
                Origin::parse(r.scope())
                    .map(|o| o.is_same_origin(window.origin()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Add a container event listener
    pub fn on<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&ContainerEvent) + Send + Sync + 'static,
    {
        self.events.on(event_type, listener)
    }

    /// Remove a container event listener
    pub fn off(&self, event_type: &EventType, id: ListenerId) -> bool {
        self.events.off(event_type, id)
    }

    /// Queue a message from a worker for delivery to this page
    pub(crate) fn deliver_message(&self, event: MessageEvent) {
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            events.emit(&ContainerEvent::Message(event));
        });
    }
}

impl fmt::Debug for ServiceWorkerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorkerContainer")
            .field("controller", &self.controller())
            .finish()
    }
}
