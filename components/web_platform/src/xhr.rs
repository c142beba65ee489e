//! XMLHttpRequest capability of a page.
//!
//! [`NativeXhr`] is the full public surface of an XHR object. The page's
//! own implementation is [`NetworkXhr`], which sends through the page's
//! native fetch; wrappers can implement the same trait by delegating to an
//! owned native instance.

use async_trait::async_trait;
use parking_lot::Mutex;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::{PlatformError, Transport};
use core_types::{Blob, Body, Headers, Method, Request, Response};
use messaging::{BusEvent, EventBus, EventType, ListenerId};

// ============================================================================
// Types
// ============================================================================

/// XMLHttpRequest ready states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ReadyState {
    /// Client has been created, open() not called yet
    #[default]
    Unsent = 0,
    /// open() has been called
    Opened = 1,
    /// send() has been called, headers received
    HeadersReceived = 2,
    /// Downloading
    Loading = 3,
    /// Operation complete
    Done = 4,
}

/// How the response body is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XhrResponseType {
    /// `""` or `"text"`
    #[default]
    Text,
    /// `"arraybuffer"`
    ArrayBuffer,
    /// `"blob"`
    Blob,
    /// `"document"`
    Document,
    /// `"json"`
    Json,
}

impl XhrResponseType {
    /// Name as used by `responseType`
    pub fn as_str(&self) -> &'static str {
        match self {
            XhrResponseType::Text => "text",
            XhrResponseType::ArrayBuffer => "arraybuffer",
            XhrResponseType::Blob => "blob",
            XhrResponseType::Document => "document",
            XhrResponseType::Json => "json",
        }
    }
}

impl FromStr for XhrResponseType {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "text" => Ok(XhrResponseType::Text),
            "arraybuffer" => Ok(XhrResponseType::ArrayBuffer),
            "blob" => Ok(XhrResponseType::Blob),
            "document" => Ok(XhrResponseType::Document),
            "json" => Ok(XhrResponseType::Json),
            other => Err(PlatformError::XhrState(format!(
                "'{}' is not a valid response type",
                other
            ))),
        }
    }
}

/// Progress and state events of an XHR object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XhrEventKind {
    /// `readystatechange`
    ReadyStateChange,
    /// `loadstart`
    LoadStart,
    /// `progress`
    Progress,
    /// `load`
    Load,
    /// `loadend`
    LoadEnd,
    /// `error`
    Error,
    /// `abort`
    Abort,
}

impl XhrEventKind {
    /// Every kind
    pub const ALL: [XhrEventKind; 7] = [
        XhrEventKind::ReadyStateChange,
        XhrEventKind::LoadStart,
        XhrEventKind::Progress,
        XhrEventKind::Load,
        XhrEventKind::LoadEnd,
        XhrEventKind::Error,
        XhrEventKind::Abort,
    ];

    /// DOM event name
    pub fn as_str(&self) -> &'static str {
        match self {
            XhrEventKind::ReadyStateChange => "readystatechange",
            XhrEventKind::LoadStart => "loadstart",
            XhrEventKind::Progress => "progress",
            XhrEventKind::Load => "load",
            XhrEventKind::LoadEnd => "loadend",
            XhrEventKind::Error => "error",
            XhrEventKind::Abort => "abort",
        }
    }

    /// Key on an XHR event bus
    pub fn event_type(&self) -> EventType {
        EventType::Custom(self.as_str().to_string())
    }
}

impl fmt::Display for XhrEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event fired by an XHR object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrEvent {
    /// What happened
    pub kind: XhrEventKind,
    /// Ready state when the event fired
    pub ready_state: ReadyState,
    /// Bytes loaded so far
    pub loaded: u64,
    /// Total bytes, when known
    pub total: u64,
}

impl XhrEvent {
    /// Create an event
    pub fn new(kind: XhrEventKind, ready_state: ReadyState, loaded: u64, total: u64) -> Self {
        Self {
            kind,
            ready_state,
            loaded,
            total,
        }
    }
}

impl BusEvent for XhrEvent {
    fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// XHR event listener
pub type XhrListener = Arc<dyn Fn(&XhrEvent) + Send + Sync>;

/// A parsed `document` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: String,
    elements: usize,
    source: String,
}

impl XmlDocument {
    /// Parse a well-formed XML document with exactly one root element
    pub fn parse(source: &str) -> Option<Self> {
        let mut reader = Reader::from_str(source);
        let mut root: Option<String> = None;
        let mut depth = 0usize;
        let mut elements = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    if depth == 0 {
                        if root.is_some() {
                            return None;
                        }
                        root = Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                    }
                    depth += 1;
                    elements += 1;
                }
                Ok(Event::Empty(empty)) => {
                    if depth == 0 {
                        if root.is_some() {
                            return None;
                        }
                        root = Some(String::from_utf8_lossy(empty.name().as_ref()).into_owned());
                    }
                    elements += 1;
                }
                Ok(Event::End(_)) => depth = depth.checked_sub(1)?,
                Ok(Event::Text(text)) => {
                    if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(_) => return None,
            }
        }

        if depth != 0 {
            return None;
        }
        root.map(|root| Self {
            root,
            elements,
            source: source.to_string(),
        })
    }

    /// Name of the document element
    pub fn document_element(&self) -> &str {
        &self.root
    }

    /// Number of elements in the document
    pub fn element_count(&self) -> usize {
        self.elements
    }

    /// The serialized document
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A response body exposed according to the response type
#[derive(Debug, Clone, PartialEq)]
pub enum XhrResponse {
    /// Text body
    Text(String),
    /// Parsed JSON
    Json(Value),
    /// Blob with the response's mime type
    Blob(Blob),
    /// Raw bytes
    ArrayBuffer(Vec<u8>),
    /// Parsed XML document
    Document(XmlDocument),
}

/// Decode a body for `response_type`. Malformed content yields `None`.
pub fn decode_response(
    response_type: XhrResponseType,
    body: &[u8],
    content_type: &str,
) -> Option<XhrResponse> {
    match response_type {
        XhrResponseType::Text => Some(XhrResponse::Text(
            String::from_utf8_lossy(body).into_owned(),
        )),
        XhrResponseType::Json => serde_json::from_slice(body).ok().map(XhrResponse::Json),
        XhrResponseType::Blob => Some(XhrResponse::Blob(Blob::new(content_type, body))),
        XhrResponseType::ArrayBuffer => Some(XhrResponse::ArrayBuffer(body.to_vec())),
        XhrResponseType::Document => std::str::from_utf8(body)
            .ok()
            .and_then(XmlDocument::parse)
            .map(XhrResponse::Document),
    }
}

/// Serialize headers as `getAllResponseHeaders()` does
pub fn format_headers(headers: &Headers) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect()
}

// ============================================================================
// Capability interface
// ============================================================================

/// The public surface of an XMLHttpRequest object
#[async_trait]
pub trait NativeXhr: Send + Sync {
    /// Initialize a request
    fn open(&self, method: &str, url: &str) -> Result<(), PlatformError>;
    /// Add a request header; only valid while OPENED
    fn set_request_header(&self, name: &str, value: &str) -> Result<(), PlatformError>;
    /// Send the request and wait for it to complete
    async fn send(&self, body: Option<Body>) -> Result<(), PlatformError>;
    /// Abort the request
    fn abort(&self);
    /// Force the mime type of the response
    fn override_mime_type(&self, mime: &str) -> Result<(), PlatformError>;
    /// Set how the response body is exposed
    fn set_response_type(&self, response_type: XhrResponseType) -> Result<(), PlatformError>;
    /// How the response body is exposed
    fn response_type(&self) -> XhrResponseType;
    /// Current ready state
    fn ready_state(&self) -> ReadyState;
    /// Response status, 0 before headers arrive
    fn status(&self) -> u16;
    /// Response status text
    fn status_text(&self) -> String;
    /// Decoded response body
    fn response(&self) -> Option<XhrResponse>;
    /// Response body as text; `None` unless the response type is text
    fn response_text(&self) -> Option<String>;
    /// Response body as a document; `None` unless the response type is document
    fn response_xml(&self) -> Option<XmlDocument>;
    /// Final response URL
    fn response_url(&self) -> String;
    /// A response header
    fn get_response_header(&self, name: &str) -> Option<String>;
    /// All response headers, CRLF separated
    fn get_all_response_headers(&self) -> String;
    /// Add an event listener
    fn add_event_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId;
    /// Remove an event listener
    fn remove_event_listener(&self, kind: XhrEventKind, id: ListenerId) -> bool;
}

/// Creates XHR objects for a page (`new XMLHttpRequest()`)
pub trait XhrFactory: Send + Sync {
    /// Create a new XHR object
    fn create(&self) -> Arc<dyn NativeXhr>;
}

// ============================================================================
// Network-backed implementation
// ============================================================================

#[derive(Debug, Default)]
struct XhrState {
    ready_state: ReadyState,
    method: Method,
    url: Option<Url>,
    request_headers: Headers,
    response_type: XhrResponseType,
    override_mime: Option<String>,
    send_flag: bool,
    response: Option<Response>,
    generation: u64,
}

/// XHR object that sends through a page's native fetch
pub struct NetworkXhr {
    transport: Arc<dyn Transport>,
    base: Url,
    state: Mutex<XhrState>,
    events: EventBus<XhrEvent>,
}

impl NetworkXhr {
    /// Create an XHR resolving relative URLs against `base`
    pub fn new(transport: Arc<dyn Transport>, base: Url) -> Self {
        Self {
            transport,
            base,
            state: Mutex::new(XhrState::default()),
            events: EventBus::new(),
        }
    }

    fn fire(&self, kind: XhrEventKind, loaded: u64, total: u64) {
        let ready_state = self.state.lock().ready_state;
        self.events
            .emit(&XhrEvent::new(kind, ready_state, loaded, total));
    }

    fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
        self.fire(XhrEventKind::ReadyStateChange, 0, 0);
    }

    fn with_response<T>(&self, f: impl FnOnce(&XhrState, &Response) -> Option<T>) -> Option<T> {
        let state = self.state.lock();
        let response = state.response.as_ref()?;
        f(&state, response)
    }
}

#[async_trait]
impl NativeXhr for NetworkXhr {
    fn open(&self, method: &str, url: &str) -> Result<(), PlatformError> {
        let method = Method::from_str(&method.to_uppercase())?;
        let url = self.base.join(url)?;
        {
            let mut state = self.state.lock();
            state.method = method;
            state.url = Some(url);
            state.request_headers = Headers::new();
            state.send_flag = false;
            state.response = None;
            state.generation += 1;
        }
        self.set_ready_state(ReadyState::Opened);
        Ok(())
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.ready_state != ReadyState::Opened || state.send_flag {
            return Err(PlatformError::XhrState(
                "setRequestHeader requires an opened, unsent request".to_string(),
            ));
        }
        state.request_headers.append(name, value);
        Ok(())
    }

    async fn send(&self, body: Option<Body>) -> Result<(), PlatformError> {
        let (request, generation) = {
            let mut state = self.state.lock();
            if state.ready_state != ReadyState::Opened || state.send_flag {
                return Err(PlatformError::XhrState(
                    "send requires an opened, unsent request".to_string(),
                ));
            }
            let url = state
                .url
                .clone()
                .ok_or_else(|| PlatformError::XhrState("request was never opened".to_string()))?;
            state.send_flag = true;
            let mut request = Request::new(state.method, url.as_str());
            request.headers = state.request_headers.clone();
            if let Some(body) = body {
                if state.method.allows_body() {
                    request.set_body(body);
                }
            }
            (request, state.generation)
        };

        self.fire(XhrEventKind::LoadStart, 0, 0);
        let result = self.transport.fetch(request).await;

        if self.state.lock().generation != generation {
            // aborted or re-opened while in flight
            return Ok(());
        }

        match result {
            Ok(mut response) => {
                let total = response.body.len() as u64;
                {
                    let mut state = self.state.lock();
                    if let Some(mime) = state.override_mime.clone() {
                        response.headers.set("content-type", mime);
                    }
                    state.response = Some(response);
                }
                self.set_ready_state(ReadyState::HeadersReceived);
                self.set_ready_state(ReadyState::Loading);
                self.fire(XhrEventKind::Progress, total, total);
                self.set_ready_state(ReadyState::Done);
                self.fire(XhrEventKind::Load, total, total);
                self.fire(XhrEventKind::LoadEnd, total, total);
                Ok(())
            }
            Err(err) => {
                self.set_ready_state(ReadyState::Done);
                self.fire(XhrEventKind::Error, 0, 0);
                self.fire(XhrEventKind::LoadEnd, 0, 0);
                Err(err.into())
            }
        }
    }

    fn abort(&self) {
        let was_active = {
            let mut state = self.state.lock();
            let active = state.send_flag && state.ready_state != ReadyState::Done;
            state.generation += 1;
            state.send_flag = false;
            state.response = None;
            if active {
                state.ready_state = ReadyState::Done;
            }
            active
        };
        if was_active {
            self.fire(XhrEventKind::ReadyStateChange, 0, 0);
            self.fire(XhrEventKind::Abort, 0, 0);
            self.fire(XhrEventKind::LoadEnd, 0, 0);
        }
        self.state.lock().ready_state = ReadyState::Unsent;
    }

    fn override_mime_type(&self, mime: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.ready_state >= ReadyState::Loading {
            return Err(PlatformError::XhrState(
                "overrideMimeType after loading started".to_string(),
            ));
        }
        state.override_mime = Some(mime.to_string());
        Ok(())
    }

    fn set_response_type(&self, response_type: XhrResponseType) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.ready_state >= ReadyState::Loading {
            return Err(PlatformError::XhrState(
                "responseType after loading started".to_string(),
            ));
        }
        state.response_type = response_type;
        Ok(())
    }

    fn response_type(&self) -> XhrResponseType {
        self.state.lock().response_type
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn status(&self) -> u16 {
        self.with_response(|_, r| Some(r.status)).unwrap_or(0)
    }

    fn status_text(&self) -> String {
        self.with_response(|_, r| Some(r.status_text.clone()))
            .unwrap_or_default()
    }

    fn response(&self) -> Option<XhrResponse> {
        self.with_response(|state, r| {
            if state.ready_state != ReadyState::Done {
                return None;
            }
            decode_response(state.response_type, &r.body, r.content_type().unwrap_or(""))
        })
    }

    fn response_text(&self) -> Option<String> {
        self.with_response(|state, r| {
            (state.response_type == XhrResponseType::Text)
                .then(|| String::from_utf8_lossy(&r.body).into_owned())
        })
    }

    fn response_xml(&self) -> Option<XmlDocument> {
        self.with_response(|state, r| {
            if state.response_type != XhrResponseType::Document {
                return None;
            }
            std::str::from_utf8(&r.body).ok().and_then(XmlDocument::parse)
        })
    }

    fn response_url(&self) -> String {
        self.with_response(|_, r| Some(r.url.clone()))
            .unwrap_or_default()
    }

    fn get_response_header(&self, name: &str) -> Option<String> {
        self.with_response(|_, r| r.headers.get(name).map(str::to_string))
    }

    fn get_all_response_headers(&self) -> String {
        self.with_response(|_, r| Some(format_headers(&r.headers)))
            .unwrap_or_default()
    }

    fn add_event_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId {
        self.events
            .on(kind.event_type(), move |event: &XhrEvent| listener(event))
    }

    fn remove_event_listener(&self, kind: XhrEventKind, id: ListenerId) -> bool {
        self.events.off(&kind.event_type(), id)
    }
}

impl fmt::Debug for NetworkXhr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NetworkXhr")
            .field("ready_state", &state.ready_state)
            .field("method", &state.method)
            .field("url", &state.url.as_ref().map(Url::as_str))
            .finish()
    }
}

/// Factory for [`NetworkXhr`] objects
pub struct NetworkXhrFactory {
    transport: Arc<dyn Transport>,
    base: Url,
}

impl NetworkXhrFactory {
    /// Create a factory sending through `transport`
    pub fn new(transport: Arc<dyn Transport>, base: Url) -> Self {
        Self { transport, base }
    }
}

impl XhrFactory for NetworkXhrFactory {
    fn create(&self) -> Arc<dyn NativeXhr> {
        Arc::new(NetworkXhr::new(
            Arc::clone(&self.transport),
            self.base.clone(),
        ))
    }
}
