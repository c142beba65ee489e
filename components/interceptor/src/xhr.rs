//! XMLHttpRequest wrapper that offers each request to fetch listeners.
//!
//! [`InterceptedXhr`] owns a native XHR object and forwards every
//! operation to it, except that `open`, `set_request_header` and `send`
//! also capture the request. `send` first dispatches the captured request
//! as a fetch event; a response from a listener becomes a synthetic,
//! read-only response, otherwise the native object sends for real.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::fetch::intercept;
use crate::patches::{same_object, PatchSlot, Patches};
use crate::{FetchInterceptOptions, InterceptError};
use core_types::{Body, Headers, Method, Request, Response};
use messaging::{ClientId, EventBus, ListenerId};
use web_platform::{
    decode_response, format_headers, NativeXhr, PlatformError, ReadyState, WeakScope, Window,
    XhrEvent, XhrEventKind, XhrFactory, XhrListener, XhrResponse, XhrResponseType, XmlDocument,
};

/// The request as captured from `open` / `set_request_header`
#[derive(Debug, Default)]
struct Captured {
    method: Method,
    url: Option<Url>,
    headers: Headers,
    send_flag: bool,
    /// Set while `send` waits for a fetch listener's decision
    awaiting_listener: bool,
    /// Bumped by `open` and `abort`; an in-flight `send` that sees a
    /// different value has been cancelled
    generation: u64,
    override_mime: Option<String>,
    /// A response supplied by a fetch listener
    synthetic: Option<Response>,
}

/// An XHR object whose requests can be answered by fetch listeners
pub struct InterceptedXhr {
    native: Arc<dyn NativeXhr>,
    scope: WeakScope,
    client_id: ClientId,
    grace: Duration,
    base: Url,
    captured: Mutex<Captured>,
    events: Arc<EventBus<XhrEvent>>,
}

impl InterceptedXhr {
    /// Wrap `native`. Its events are re-emitted to this object's listeners.
    pub fn new(
        native: Arc<dyn NativeXhr>,
        scope: WeakScope,
        client_id: ClientId,
        grace: Duration,
        base: Url,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        for kind in XhrEventKind::ALL {
            let events = Arc::clone(&events);
            native.add_event_listener(
                kind,
                Arc::new(move |event: &XhrEvent| {
                    events.emit(event);
                }),
            );
        }
        Self {
            native,
            scope,
            client_id,
            grace,
            base,
            captured: Mutex::new(Captured::default()),
            events,
        }
    }

    /// The wrapped native object
    pub fn native(&self) -> &Arc<dyn NativeXhr> {
        &self.native
    }

    /// Whether the current response came from a fetch listener
    pub fn is_synthetic(&self) -> bool {
        self.captured.lock().synthetic.is_some()
    }

    fn with_synthetic<T>(&self, f: impl FnOnce(&Response) -> T) -> Option<T> {
        self.captured.lock().synthetic.as_ref().map(f)
    }

    /// Whether the `send` started at `generation` is still current
    fn is_current(&self, generation: u64) -> bool {
        self.captured.lock().generation == generation
    }

    fn fire(&self, kind: XhrEventKind, loaded: u64) {
        self.events
            .emit(&XhrEvent::new(kind, ReadyState::Done, loaded, loaded));
    }

    /// Expose a listener's response and fire the load events
    fn complete_with(&self, mut response: Response) {
        let total = response.body.len() as u64;
        {
            let mut captured = self.captured.lock();
            if let Some(mime) = captured.override_mime.clone() {
                response.headers.set("content-type", mime);
            }
            captured.synthetic = Some(response);
        }
        for kind in [
            XhrEventKind::ReadyStateChange,
            XhrEventKind::LoadStart,
            XhrEventKind::Progress,
            XhrEventKind::Load,
            XhrEventKind::LoadEnd,
        ] {
            self.fire(kind, total);
        }
    }

    fn fail_with(&self) {
        self.captured.lock().synthetic = Some(Response::error());
        for kind in [
            XhrEventKind::ReadyStateChange,
            XhrEventKind::Error,
            XhrEventKind::LoadEnd,
        ] {
            self.fire(kind, 0);
        }
    }
}

#[async_trait]
impl NativeXhr for InterceptedXhr {
    fn open(&self, method: &str, url: &str) -> Result<(), PlatformError> {
        let parsed_method = Method::from_str(method)?;
        let resolved = self.base.join(url)?;
        self.native.open(method, url)?;
        let mut captured = self.captured.lock();
        captured.method = parsed_method;
        captured.url = Some(resolved);
        captured.headers = Headers::new();
        captured.send_flag = false;
        captured.awaiting_listener = false;
        captured.generation += 1;
        captured.synthetic = None;
        Ok(())
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<(), PlatformError> {
        self.native.set_request_header(name, value)?;
        self.captured.lock().headers.append(name, value);
        Ok(())
    }

    async fn send(&self, body: Option<Body>) -> Result<(), PlatformError> {
        let (request, generation) = {
            let mut captured = self.captured.lock();
            if self.native.ready_state() != ReadyState::Opened || captured.send_flag {
                return Err(PlatformError::XhrState(
                    "send requires an opened, unsent request".to_string(),
                ));
            }
            let url = captured
                .url
                .clone()
                .ok_or_else(|| PlatformError::XhrState("request was never opened".to_string()))?;
            captured.send_flag = true;
            captured.awaiting_listener = true;
            let mut request = Request::new(captured.method, url.as_str());
            request.headers = captured.headers.clone();
            if let Some(body) = body.clone() {
                if captured.method.allows_body() {
                    request.set_body(body);
                }
            }
            (request, captured.generation)
        };

        let pending = match self.scope.upgrade() {
            Some(scope) => intercept(&scope, request, self.client_id.clone(), self.grace).await,
            None => None,
        };
        if !self.is_current(generation) {
            tracing::debug!("XHR aborted while waiting for fetch listeners");
            return Ok(());
        }

        match pending {
            Some(response) => {
                let outcome = response.await;
                if !self.is_current(generation) {
                    tracing::debug!("XHR aborted before its synthetic response arrived");
                    return Ok(());
                }
                self.captured.lock().awaiting_listener = false;
                match outcome {
                    Ok(response) => {
                        tracing::debug!(url = %response.url, status = response.status, "XHR answered by fetch listener");
                        self.complete_with(response);
                        Ok(())
                    }
                    Err(err) => {
                        self.fail_with();
                        Err(err.into())
                    }
                }
            }
            None => {
                self.captured.lock().awaiting_listener = false;
                self.native.send(body).await
            }
        }
    }

    fn abort(&self) {
        let was_awaiting = {
            let mut captured = self.captured.lock();
            let awaiting = captured.awaiting_listener;
            captured.generation += 1;
            captured.awaiting_listener = false;
            captured.synthetic = None;
            captured.send_flag = false;
            awaiting
        };
        // the native object only knows about requests it sent itself
        self.native.abort();
        if was_awaiting {
            for kind in [
                XhrEventKind::ReadyStateChange,
                XhrEventKind::Abort,
                XhrEventKind::LoadEnd,
            ] {
                self.fire(kind, 0);
            }
        }
    }

    fn override_mime_type(&self, mime: &str) -> Result<(), PlatformError> {
        self.native.override_mime_type(mime)?;
        self.captured.lock().override_mime = Some(mime.to_string());
        Ok(())
    }

    fn set_response_type(&self, response_type: XhrResponseType) -> Result<(), PlatformError> {
        if self.is_synthetic() {
            return Err(PlatformError::XhrState(
                "responseType after loading started".to_string(),
            ));
        }
        self.native.set_response_type(response_type)
    }

    fn response_type(&self) -> XhrResponseType {
        self.native.response_type()
    }

    fn ready_state(&self) -> ReadyState {
        if self.is_synthetic() {
            return ReadyState::Done;
        }
        self.native.ready_state()
    }

    fn status(&self) -> u16 {
        self.with_synthetic(|r| r.status)
            .unwrap_or_else(|| self.native.status())
    }

    fn status_text(&self) -> String {
        self.with_synthetic(|r| r.status_text.clone())
            .unwrap_or_else(|| self.native.status_text())
    }

    fn response(&self) -> Option<XhrResponse> {
        let response_type = self.response_type();
        match self.with_synthetic(|r| decode_response(response_type, &r.body, r.content_type().unwrap_or(""))) {
            Some(decoded) => decoded,
            None => self.native.response(),
        }
    }

    fn response_text(&self) -> Option<String> {
        if !self.is_synthetic() {
            return self.native.response_text();
        }
        match self.response()? {
            XhrResponse::Text(text) => Some(text),
            _ => None,
        }
    }

    fn response_xml(&self) -> Option<XmlDocument> {
        if !self.is_synthetic() {
            return self.native.response_xml();
        }
        match self.response()? {
            XhrResponse::Document(document) => Some(document),
            _ => None,
        }
    }

    fn response_url(&self) -> String {
        self.with_synthetic(|r| r.url.clone())
            .unwrap_or_else(|| self.native.response_url())
    }

    fn get_response_header(&self, name: &str) -> Option<String> {
        match self.with_synthetic(|r| r.headers.get(name).map(str::to_string)) {
            Some(value) => value,
            None => self.native.get_response_header(name),
        }
    }

    fn get_all_response_headers(&self) -> String {
        self.with_synthetic(|r| format_headers(&r.headers))
            .unwrap_or_else(|| self.native.get_all_response_headers())
    }

    fn add_event_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId {
        self.events
            .on(kind.event_type(), move |event: &XhrEvent| listener(event))
    }

    fn remove_event_listener(&self, kind: XhrEventKind, id: ListenerId) -> bool {
        self.events.off(&kind.event_type(), id)
    }
}

/// Creates [`InterceptedXhr`] objects around a page's native XHR
struct InterceptingFactory {
    native: Arc<dyn XhrFactory>,
    scope: WeakScope,
    grace: Duration,
    base: Url,
}

impl XhrFactory for InterceptingFactory {
    fn create(&self) -> Arc<dyn NativeXhr> {
        Arc::new(InterceptedXhr::new(
            self.native.create(),
            self.scope.clone(),
            ClientId::legacy(),
            self.grace,
            self.base.clone(),
        ))
    }
}

/// An XHR patch installed on one page
pub struct XhrInterceptor {
    window: Window,
    installed: Arc<dyn XhrFactory>,
    original: Arc<dyn XhrFactory>,
}

impl XhrInterceptor {
    /// Replace `window`'s XHR constructor with one producing
    /// [`InterceptedXhr`] objects
    pub fn install(window: &Window, options: FetchInterceptOptions) -> Result<Self, InterceptError> {
        if window.is_closed() {
            return Err(InterceptError::PageClosed);
        }
        Patches::for_scope(window.scope()).claim(PatchSlot::Xhr)?;

        let original = window.native_xhr_factory();
        let installed: Arc<dyn XhrFactory> = Arc::new(InterceptingFactory {
            native: Arc::clone(&original),
            scope: window.scope().downgrade(),
            grace: options.grace(),
            base: window.url().clone(),
        });
        let previous = window.install_xhr_factory(Arc::clone(&installed));
        tracing::debug!(window = %window.id(), "XMLHttpRequest patched");

        Ok(Self {
            window: window.clone(),
            installed,
            original: previous,
        })
    }

    /// Whether the patch is still installed
    pub fn is_installed(&self) -> bool {
        same_object(&self.window.current_xhr_factory(), &self.installed)
    }

    /// Restore the previous XHR constructor
    pub fn uninstall(&self) -> Result<(), InterceptError> {
        if !self.is_installed() {
            return Err(InterceptError::Displaced(PatchSlot::Xhr.name()));
        }
        self.window.install_xhr_factory(Arc::clone(&self.original));
        Patches::for_scope(self.window.scope()).release(PatchSlot::Xhr);
        tracing::debug!(window = %self.window.id(), "XMLHttpRequest restored");
        Ok(())
    }
}
