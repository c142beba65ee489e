//! Page contexts.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use url::Url;

use crate::browser::BrowserInner;
use crate::fetch_event::dispatch_fetch;
use crate::{
    Browser, GlobalScope, KeyValueStore, NativeXhr, NetworkError, NetworkXhrFactory, Origin,
    PlatformError, ScopeEvent, ServiceWorker, ServiceWorkerContainer, ServiceWorkerState,
    Transport, WindowTarget, WorkerTarget, XhrFactory,
};
use core_types::{Request, RequestInit, Response};
use messaging::ClientId;

pub(crate) struct WindowInner {
    id: ClientId,
    url: Url,
    origin: Origin,
    secure: bool,
    browser: Weak<BrowserInner>,
    scope: GlobalScope,
    container: ServiceWorkerContainer,
    storage: Arc<dyn KeyValueStore>,
    native_fetch: Arc<dyn Transport>,
    fetch: RwLock<Arc<dyn Transport>>,
    native_xhr: Arc<dyn XhrFactory>,
    xhr: RwLock<Arc<dyn XhrFactory>>,
    closed: AtomicBool,
}

/// A page context (browser tab).
///
/// The page's `fetch` and `XMLHttpRequest` constructor are patchable slots.
/// The untouched native implementations stay reachable through
/// [`Window::native_fetch`] and [`Window::native_xhr_factory`].
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

impl Window {
    pub(crate) fn open(
        browser: &Browser,
        url: Url,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, PlatformError> {
        let origin = Origin::from_url(&url)?;
        let secure = origin.is_potentially_trustworthy();
        let network = browser.network();
        let browser_weak = browser.downgrade();

        let inner = Arc::new_cyclic(|weak: &Weak<WindowInner>| {
            let native_fetch: Arc<dyn Transport> = Arc::new(ControlledFetch {
                window: weak.clone(),
                network,
            });
            let native_xhr: Arc<dyn XhrFactory> = Arc::new(NetworkXhrFactory::new(
                Arc::clone(&native_fetch),
                url.clone(),
            ));
            WindowInner {
                id: ClientId::generate(),
                scope: GlobalScope::page(url.clone(), Arc::clone(&native_fetch), weak.clone()),
                container: ServiceWorkerContainer::new(weak.clone(), browser_weak.clone()),
                url,
                origin,
                secure,
                browser: browser_weak,
                storage,
                fetch: RwLock::new(Arc::clone(&native_fetch)),
                native_fetch,
                xhr: RwLock::new(Arc::clone(&native_xhr)),
                native_xhr,
                closed: AtomicBool::new(false),
            }
        });
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<WindowInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<WindowInner> {
        Arc::downgrade(&self.inner)
    }

    /// Page identity as reported to workers
    pub fn id(&self) -> &ClientId {
        &self.inner.id
    }

    /// Page URL
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Page origin
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// Whether the page runs in a secure context
    pub fn is_secure_context(&self) -> bool {
        self.inner.secure
    }

    /// The browser the page belongs to
    pub fn browser(&self) -> Option<Browser> {
        self.inner.browser.upgrade().map(Browser::from_inner)
    }

    /// The page's global scope
    pub fn scope(&self) -> &GlobalScope {
        &self.inner.scope
    }

    /// `navigator.serviceWorker`
    pub fn container(&self) -> &ServiceWorkerContainer {
        &self.inner.container
    }

    /// The worker controlling the page
    pub fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.inner.container.controller()
    }

    /// The page's persistent key/value store
    pub fn storage(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.inner.storage)
    }

    /// `window.fetch(input, init)` through whatever is installed in the fetch slot
    pub async fn fetch(&self, input: &str, init: RequestInit) -> Result<Response, PlatformError> {
        let request = Request::from_init(&self.inner.url, input, init)?;
        self.send(request).await
    }

    /// Issue an already built request through the fetch slot
    pub async fn send(&self, request: Request) -> Result<Response, PlatformError> {
        if self.is_closed() {
            return Err(PlatformError::WindowClosed(self.inner.id.to_string()));
        }
        let transport = self.current_fetch();
        Ok(transport.fetch(request).await?)
    }

    /// The fetch the page was created with
    pub fn native_fetch(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.native_fetch)
    }

    /// What is currently installed in the fetch slot
    pub fn current_fetch(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.fetch.read())
    }

    /// Install a fetch implementation, returning the one it replaces
    pub fn install_fetch(&self, fetch: Arc<dyn Transport>) -> Arc<dyn Transport> {
        std::mem::replace(&mut *self.inner.fetch.write(), fetch)
    }

    /// `new XMLHttpRequest()`
    pub fn xml_http_request(&self) -> Arc<dyn NativeXhr> {
        let factory = Arc::clone(&self.inner.xhr.read());
        factory.create()
    }

    /// The XHR constructor the page was created with
    pub fn native_xhr_factory(&self) -> Arc<dyn XhrFactory> {
        Arc::clone(&self.inner.native_xhr)
    }

    /// What is currently installed as the XHR constructor
    pub fn current_xhr_factory(&self) -> Arc<dyn XhrFactory> {
        Arc::clone(&self.inner.xhr.read())
    }

    /// Install an XHR constructor, returning the one it replaces
    pub fn install_xhr_factory(&self, factory: Arc<dyn XhrFactory>) -> Arc<dyn XhrFactory> {
        std::mem::replace(&mut *self.inner.xhr.write(), factory)
    }

    /// Evaluate a script in the page (`<script src=...>`)
    pub fn load_script(&self, script_url: &str) -> Result<(), PlatformError> {
        let browser = self
            .browser()
            .ok_or_else(|| PlatformError::WindowClosed(self.inner.id.to_string()))?;
        let url = self.inner.url.join(script_url)?;
        let (script, version) = browser
            .scripts()
            .resolve(&url)
            .ok_or_else(|| PlatformError::ScriptNotFound(url.to_string()))?;
        tracing::debug!(window = %self.inner.id, script = %url, version, "evaluating page script");
        script(&self.inner.scope);
        Ok(())
    }

    /// Messages to the controlling worker; `None` when uncontrolled
    pub fn controller_target(&self) -> Option<WorkerTarget> {
        self.controller().map(|worker| self.worker_target(worker))
    }

    /// Messages from this page to `worker`, which need not control it
    pub fn worker_target(&self, worker: Arc<ServiceWorker>) -> WorkerTarget {
        let reports_source = self
            .browser()
            .map(|b| b.config().reports_message_source)
            .unwrap_or(true);
        let source = reports_source.then(|| self.inner.id.clone());
        WorkerTarget::new(worker, source, &self.inner.origin)
    }

    /// Messages to the page itself
    pub fn self_target(&self) -> WindowTarget {
        WindowTarget::new(self.inner.scope.clone())
    }

    /// Tear the page down. Listeners see `unload` first.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scope.dispatch(&ScopeEvent::Unload);
        self.inner.container.adopt_controller(None);
        tracing::debug!(window = %self.inner.id, "window closed");
    }

    /// Whether the page has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same page
    pub fn ptr_eq(&self, other: &Window) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The page's native fetch: routed through the controlling worker when there
/// is an activated one, straight to the network otherwise.
struct ControlledFetch {
    window: Weak<WindowInner>,
    network: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for ControlledFetch {
    async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
        let controlled = self.window.upgrade().and_then(|window| {
            let worker = window.container.controller()?;
            (worker.state() == ServiceWorkerState::Activated).then(|| (worker, window.id.clone()))
        });

        if let Some((worker, client_id)) = controlled {
            let pending =
                dispatch_fetch(&worker.scope(), request.clone(), client_id, Duration::ZERO).await;
            if let Some(response) = pending {
                return response.await;
            }
            tracing::trace!(url = %request.url, "not handled by the controller, using network");
        }
        self.network.fetch(request).await
    }
}
