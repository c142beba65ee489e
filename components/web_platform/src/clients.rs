//! The worker-side view of the pages it may control.

use std::fmt;
use std::sync::Weak;

use crate::browser::BrowserInner;
use crate::service_worker::RegistrationInner;
use crate::{Browser, PlatformError, ServiceWorkerRegistration, ServiceWorkerState, Window};
use messaging::{ClientId, Delivery, Message, MessageEvent, MessagePort, MessageTarget, MessagingError};
use url::Url;

/// `self.clients` of a worker scope
#[derive(Clone)]
pub struct Clients {
    registration: Weak<RegistrationInner>,
    browser: Weak<BrowserInner>,
}

impl Clients {
    pub(crate) fn new(registration: Weak<RegistrationInner>, browser: Weak<BrowserInner>) -> Self {
        Self {
            registration,
            browser,
        }
    }

    fn registration(&self) -> Option<ServiceWorkerRegistration> {
        self.registration
            .upgrade()
            .map(ServiceWorkerRegistration::from_inner)
    }

    /// Open pages within the registration's scope, in opening order
    pub fn match_all(&self) -> Vec<WindowClient> {
        let (Some(browser), Some(registration)) = (
            self.browser.upgrade().map(Browser::from_inner),
            self.registration(),
        ) else {
            return Vec::new();
        };
        browser
            .windows()
            .into_iter()
            .filter(|w| !w.is_closed() && registration.covers(w.url()))
            .map(|window| WindowClient { window })
            .collect()
    }

    /// Open pages currently controlled by the registration's active worker
    pub fn controlled(&self) -> Vec<WindowClient> {
        let Some(active) = self.registration().and_then(|r| r.active()) else {
            return Vec::new();
        };
        self.match_all()
            .into_iter()
            .filter(|c| c.window.controller().is_some_and(|w| w.id() == active.id()))
            .collect()
    }

    /// The in-scope page with the given identity
    pub fn get(&self, id: &ClientId) -> Option<WindowClient> {
        self.match_all().into_iter().find(|c| c.id() == id)
    }

    /// Make the registration's active worker the controller of every in-scope
    /// page it does not control yet. Each newly controlled page sees a
    /// `controllerchange`.
    pub fn claim(&self) -> Result<usize, PlatformError> {
        let registration = self
            .registration()
            .ok_or_else(|| PlatformError::RegistrationNotFound("<dropped>".to_string()))?;
        let active = registration
            .active()
            .ok_or_else(|| PlatformError::InvalidState {
                expected: ServiceWorkerState::Activated.to_string(),
                actual: ServiceWorkerState::Parsed,
            })?;
        let state = active.state();
        if state != ServiceWorkerState::Activated && state != ServiceWorkerState::Activating {
            return Err(PlatformError::InvalidState {
                expected: ServiceWorkerState::Activated.to_string(),
                actual: state,
            });
        }

        let mut claimed = 0;
        for client in self.match_all() {
            let container = client.window.container();
            if container.controller().map(|c| c.id()) != Some(active.id()) {
                container.set_controller(Some(active.clone()));
                claimed += 1;
            }
        }
        tracing::debug!(scope = %registration.scope(), claimed, "clients claimed");
        Ok(claimed)
    }
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients")
            .field("alive", &(self.registration.strong_count() > 0))
            .finish()
    }
}

/// A page as seen from a worker
#[derive(Clone, Debug)]
pub struct WindowClient {
    window: Window,
}

impl WindowClient {
    /// Page identity
    pub fn id(&self) -> &ClientId {
        self.window.id()
    }

    /// Page URL
    pub fn url(&self) -> &Url {
        self.window.url()
    }

    /// The page itself
    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl MessageTarget for WindowClient {
    fn post_message(
        &self,
        message: Message,
        ports: Vec<MessagePort>,
        _delivery: Delivery,
    ) -> Result<(), MessagingError> {
        if self.window.is_closed() {
            return Err(MessagingError::Delivery(format!(
                "client {} has been closed",
                self.id()
            )));
        }
        let mut event = MessageEvent::new(message);
        event.ports = ports;
        event.origin = self.window.origin().serialize();
        self.window.container().deliver_message(event);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("client {}", self.id())
    }
}
