//! A browser profile: windows, registrations, scripts and the network.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use url::Url;

use crate::window::WindowInner;
use crate::{
    KeyValueStore, MemoryStore, Origin, PlatformError, ScriptRegistry, ServiceWorkerRegistration,
    ServiceWorkerState, StaticNetwork, Transport, Window,
};

/// Browser capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Whether service workers are available at all
    pub service_workers: bool,
    /// Whether worker-bound messages report their sending page. Older
    /// engines leave the source empty.
    pub reports_message_source: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            service_workers: true,
            reports_message_source: true,
        }
    }
}

pub(crate) struct BrowserInner {
    config: BrowserConfig,
    scripts: ScriptRegistry,
    network: Arc<dyn Transport>,
    windows: Mutex<Vec<Weak<WindowInner>>>,
    registrations: Mutex<Vec<ServiceWorkerRegistration>>,
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

/// One browser profile.
///
/// Cloning yields another handle to the same profile.
#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

impl Browser {
    /// A browser with default capabilities and an empty in-memory network
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a browser
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::default()
    }

    pub(crate) fn from_inner(inner: Arc<BrowserInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<BrowserInner> {
        Arc::downgrade(&self.inner)
    }

    /// Browser capabilities
    pub fn config(&self) -> BrowserConfig {
        self.inner.config
    }

    /// Scripts served to pages and workers
    pub fn scripts(&self) -> &ScriptRegistry {
        &self.inner.scripts
    }

    /// The real network
    pub fn network(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.network)
    }

    /// Open a page. A page inside the scope of an activated registration
    /// starts out controlled by its active worker.
    pub fn open_window(&self, url: &str) -> Result<Window, PlatformError> {
        let url = Url::parse(url)?;
        let storage = self.store_for(&Origin::from_url(&url)?);
        let window = Window::open(self, url, storage)?;

        if let Some(active) = self
            .match_registration(window.url())
            .and_then(|r| r.active())
            .filter(|w| w.state() == ServiceWorkerState::Activated)
        {
            window.container().adopt_controller(Some(active));
        }

        let mut windows = self.inner.windows.lock();
        windows.retain(|w| w.strong_count() > 0);
        windows.push(window.downgrade());
        drop(windows);

        tracing::debug!(window = %window.id(), url = %window.url(), "window opened");
        Ok(window)
    }

    /// Open pages, in opening order
    pub fn windows(&self) -> Vec<Window> {
        self.inner
            .windows
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Window::from_inner)
            .filter(|w| !w.is_closed())
            .collect()
    }

    /// Every live registration
    pub fn registrations(&self) -> Vec<ServiceWorkerRegistration> {
        self.inner.registrations.lock().clone()
    }

    /// The registration with exactly this scope
    pub(crate) fn registration_for_scope(&self, scope: &Url) -> Option<ServiceWorkerRegistration> {
        self.inner
            .registrations
            .lock()
            .iter()
            .find(|r| r.scope() == scope.as_str())
            .cloned()
    }

    /// The registration whose scope is the longest prefix of `url`
    pub fn match_registration(&self, url: &Url) -> Option<ServiceWorkerRegistration> {
        self.inner
            .registrations
            .lock()
            .iter()
            .filter(|r| r.covers(url))
            .max_by_key(|r| r.scope().len())
            .cloned()
    }

    pub(crate) fn add_registration(&self, registration: ServiceWorkerRegistration) {
        self.inner.registrations.lock().push(registration);
    }

    pub(crate) fn remove_registration(&self, id: u64) {
        self.inner.registrations.lock().retain(|r| r.id() != id);
    }

    /// The persistent store shared by every page of `origin`
    pub fn store_for(&self, origin: &Origin) -> Arc<dyn KeyValueStore> {
        let mut stores = self.inner.stores.lock();
        let store = stores.entry(origin.serialize()).or_default();
        Arc::clone(store) as Arc<dyn KeyValueStore>
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("config", &self.inner.config)
            .field("windows", &self.inner.windows.lock().len())
            .field("registrations", &self.inner.registrations.lock().len())
            .finish()
    }
}

/// Builder for [`Browser`]
#[derive(Default)]
pub struct BrowserBuilder {
    config: BrowserConfig,
    network: Option<Arc<dyn Transport>>,
}

impl BrowserBuilder {
    /// Use a specific network
    pub fn network(mut self, network: Arc<dyn Transport>) -> Self {
        self.network = Some(network);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BrowserConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable service workers
    pub fn service_workers(mut self, enabled: bool) -> Self {
        self.config.service_workers = enabled;
        self
    }

    /// Whether worker-bound messages report their sender
    pub fn reports_message_source(mut self, reports: bool) -> Self {
        self.config.reports_message_source = reports;
        self
    }

    /// Build the browser
    pub fn build(self) -> Browser {
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(StaticNetwork::new()) as Arc<dyn Transport>);
        Browser {
            inner: Arc::new(BrowserInner {
                config: self.config,
                scripts: ScriptRegistry::new(),
                network,
                windows: Mutex::new(Vec::new()),
                registrations: Mutex::new(Vec::new()),
                stores: Mutex::new(HashMap::new()),
            }),
        }
    }
}
