//! Page-level `fetch` patching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::patches::{same_object, PatchSlot, Patches};
use crate::InterceptError;
use core_types::{Request, Response};
use messaging::ClientId;
use web_platform::{dispatch_fetch, GlobalScope, NetworkError, ResponseFuture, Transport, WeakScope, Window};

/// How long a self-dispatched request waits for `respond_with` before
/// falling through to the network
pub const LEGACY_GRACE: Duration = Duration::from_millis(300);

/// Options for page-level interception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchInterceptOptions {
    /// Milliseconds a handler has to call `respond_with`. Zero only
    /// accepts responses given during the dispatch itself.
    pub grace_ms: u64,
}

impl FetchInterceptOptions {
    /// Only accept responses given during the dispatch itself
    pub fn turn_based() -> Self {
        Self { grace_ms: 0 }
    }

    /// The grace period as a duration
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for FetchInterceptOptions {
    fn default() -> Self {
        Self {
            grace_ms: LEGACY_GRACE.as_millis() as u64,
        }
    }
}

/// Dispatch `request` as a fetch event on `scope`.
///
/// Returns the promised response, or `None` when no listener called
/// `respond_with` within `grace`.
pub async fn intercept(
    scope: &GlobalScope,
    request: Request,
    client_id: ClientId,
    grace: Duration,
) -> Option<ResponseFuture> {
    let url = request.url.clone();
    let pending = dispatch_fetch(scope, request, client_id, grace).await;
    if pending.is_none() {
        tracing::debug!(url = %url, "no fetch listener responded, falling through");
    }
    pending
}

/// The function installed in a patched page's fetch slot
struct PatchedFetch {
    scope: WeakScope,
    client_id: ClientId,
    grace: Duration,
    original: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for PatchedFetch {
    async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
        if let Some(scope) = self.scope.upgrade() {
            let pending = intercept(&scope, request.clone(), self.client_id.clone(), self.grace).await;
            if let Some(response) = pending {
                return response.await;
            }
        }
        self.original.fetch(request).await
    }
}

/// A fetch patch installed on one page.
///
/// Requests issued through [`Window::fetch`] are dispatched as fetch
/// events on the page's own scope under the legacy client identity, and
/// fall through to the original fetch when nobody responds.
pub struct FetchInterceptor {
    window: Window,
    installed: Arc<dyn Transport>,
    original: Arc<dyn Transport>,
}

impl FetchInterceptor {
    /// Patch `window`'s fetch slot
    pub fn install(window: &Window, options: FetchInterceptOptions) -> Result<Self, InterceptError> {
        if window.is_closed() {
            return Err(InterceptError::PageClosed);
        }
        let patches = Patches::for_scope(window.scope());
        patches.claim(PatchSlot::Fetch)?;

        let original = window.current_fetch();
        let installed: Arc<dyn Transport> = Arc::new(PatchedFetch {
            scope: window.scope().downgrade(),
            client_id: ClientId::legacy(),
            grace: options.grace(),
            original: Arc::clone(&original),
        });
        window.install_fetch(Arc::clone(&installed));
        tracing::debug!(window = %window.id(), grace_ms = options.grace_ms, "fetch patched");

        Ok(Self {
            window: window.clone(),
            installed,
            original,
        })
    }

    /// The fetch that was in place before patching
    pub fn original(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.original)
    }

    /// Whether the patch is still in the page's fetch slot
    pub fn is_installed(&self) -> bool {
        same_object(&self.window.current_fetch(), &self.installed)
    }

    /// Restore the original fetch
    pub fn uninstall(&self) -> Result<(), InterceptError> {
        if !self.is_installed() {
            return Err(InterceptError::Displaced(PatchSlot::Fetch.name()));
        }
        self.window.install_fetch(Arc::clone(&self.original));
        Patches::for_scope(self.window.scope()).release(PatchSlot::Fetch);
        tracing::debug!(window = %self.window.id(), "fetch restored");
        Ok(())
    }
}
