//! Deferred response builder handed to route handlers.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::RouterError;
use core_types::{
    is_null_body_status, status_text, Blob, Body, Headers, Method, Request, RequestInit, Response,
    JSON_MIME, OCTET_STREAM,
};
use web_platform::{NetworkError, ResponseFuture, Transport};

type Outcome = Result<Response, NetworkError>;

/// Anything `send` accepts
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Sent as `text/html` unless a type is already set
    Text(String),
    /// Sent with the blob's own type, or as binary
    Blob(Blob),
    /// Sent as binary unless a type is already set
    ArrayBuffer(Vec<u8>),
    /// A complete response, passed through verbatim
    Response(Response),
    /// Serialized as JSON
    Json(serde_json::Value),
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<Blob> for ResponseBody {
    fn from(blob: Blob) -> Self {
        ResponseBody::Blob(blob)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::ArrayBuffer(bytes)
    }
}

impl From<Response> for ResponseBody {
    fn from(response: Response) -> Self {
        ResponseBody::Response(response)
    }
}

impl From<serde_json::Value> for ResponseBody {
    fn from(value: serde_json::Value) -> Self {
        ResponseBody::Json(value)
    }
}

/// Expand a `type()` shorthand into a mime type
fn expand_mime(mime: &str) -> String {
    match mime {
        "html" => "text/html".to_string(),
        "text" => "text/plain".to_string(),
        "json" => JSON_MIME.to_string(),
        "xml" => "application/xml".to_string(),
        "js" | "javascript" => "application/javascript".to_string(),
        "css" => "text/css".to_string(),
        "form" | "urlencoded" => core_types::FORM_MIME.to_string(),
        "bin" | "binary" => OCTET_STREAM.to_string(),
        other => other.to_string(),
    }
}

struct ResponseState {
    status: u16,
    headers: Headers,
    body: Option<Vec<u8>>,
    sender: Option<oneshot::Sender<Outcome>>,
}

struct ResponseInner {
    request: Arc<Request>,
    native_fetch: Arc<dyn Transport>,
    state: Mutex<ResponseState>,
}

/// Builds the response for one intercepted request.
///
/// The response is delivered exactly once, by [`end`](Self::end) (or a
/// method finishing with it) or by [`forward`](Self::forward). Dropping
/// every handle without finishing resolves the request with
/// [`NetworkError::Abandoned`].
#[derive(Clone)]
pub struct MockerResponse {
    inner: Arc<ResponseInner>,
}

impl MockerResponse {
    /// Create a response builder and the future it resolves.
    ///
    /// `native_fetch` is used by [`forward`](Self::forward) and must not
    /// route back into interception.
    pub fn new(request: Arc<Request>, native_fetch: Arc<dyn Transport>) -> (Self, ResponseFuture) {
        let (tx, rx) = oneshot::channel();
        let url = request.url.clone();
        let response = Self {
            inner: Arc::new(ResponseInner {
                request,
                native_fetch,
                state: Mutex::new(ResponseState {
                    status: 200,
                    headers: Headers::new(),
                    body: None,
                    sender: Some(tx),
                }),
            }),
        };
        (response, pending_response(rx, url))
    }

    /// Set the status code
    pub fn status(&self, code: u16) -> &Self {
        self.inner.state.lock().status = code;
        self
    }

    /// Set the content type. Accepts a mime type or a shorthand such as
    /// `json`, `html`, `text` or `binary`.
    pub fn content_type(&self, mime: &str) -> &Self {
        self.set("content-type", expand_mime(mime))
    }

    /// Set a header
    pub fn set(&self, name: &str, value: impl Into<String>) -> &Self {
        self.inner.state.lock().headers.set(name, value);
        self
    }

    /// Headers set so far
    pub fn headers(&self) -> Headers {
        self.inner.state.lock().headers.clone()
    }

    /// Current status code
    pub fn status_code(&self) -> u16 {
        self.inner.state.lock().status
    }

    /// Whether the response has been delivered
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().sender.is_none()
    }

    /// Send a JSON body. The content type becomes JSON unless already set.
    pub fn json<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), RouterError> {
        let bytes = serde_json::to_vec(body)?;
        self.write_body(bytes, JSON_MIME);
        self.end()
    }

    /// Send a body, choosing the content type from its shape
    pub fn send(&self, body: impl Into<ResponseBody>) -> Result<(), RouterError> {
        match body.into() {
            ResponseBody::Text(text) => self.write_body(text.into_bytes(), "text/html"),
            ResponseBody::Blob(blob) => {
                let mime = if blob.content_type.is_empty() {
                    OCTET_STREAM.to_string()
                } else {
                    blob.content_type.clone()
                };
                self.write_body(blob.data, &mime);
            }
            ResponseBody::ArrayBuffer(bytes) => self.write_body(bytes, OCTET_STREAM),
            ResponseBody::Response(response) => return self.deliver(Ok(response)),
            ResponseBody::Json(value) => return self.json(&value),
        }
        self.end()
    }

    /// Send `code` with its status text as a plain-text body
    pub fn send_status(&self, code: u16) -> Result<(), RouterError> {
        let text = match status_text(code) {
            "" => code.to_string(),
            text => text.to_string(),
        };
        self.content_type("text").status(code).send(text)
    }

    /// Finish the response with whatever has been set.
    ///
    /// HEAD requests and null-body statuses (101, 204, 205, 304) never
    /// carry a body. The content type defaults to `text/plain`.
    pub fn end(&self) -> Result<(), RouterError> {
        let response = {
            let mut state = self.inner.state.lock();
            if state.sender.is_none() {
                return Err(RouterError::AlreadySent);
            }
            let status = state.status;
            let body = if self.inner.request.method == Method::Head || is_null_body_status(status) {
                Vec::new()
            } else {
                state.body.take().unwrap_or_default()
            };
            let mut response = Response::new(status, body).with_url(self.inner.request.url.clone());
            response.headers = state.headers.clone();
            if !response.headers.contains("content-type") {
                response.headers.set("content-type", "text/plain");
            }
            response
        };
        self.deliver(Ok(response))
    }

    /// Answer with a real network response.
    ///
    /// `input` is resolved against the intercepted request's URL; `None`
    /// re-issues the original request. When `init` carries no body, the
    /// original body is carried over as text for form and text content,
    /// and as a blob otherwise. The request goes straight to the network
    /// and is never intercepted again.
    pub fn forward(&self, input: Option<&str>, init: RequestInit) -> Result<(), RouterError> {
        let sender = self
            .inner
            .state
            .lock()
            .sender
            .take()
            .ok_or(RouterError::AlreadySent)?;

        let request = self.forwarded_request(input, init)?;
        let native_fetch = Arc::clone(&self.inner.native_fetch);
        tracing::debug!(from = %self.inner.request.url, to = %request.url, "forwarding to network");
        tokio::spawn(async move {
            let outcome = native_fetch.fetch(request).await;
            let _ = sender.send(outcome);
        });
        Ok(())
    }

    fn forwarded_request(&self, input: Option<&str>, mut init: RequestInit) -> Result<Request, RouterError> {
        let original = &self.inner.request;
        let base = original.parsed_url()?;
        let input = input.unwrap_or(original.url.as_str());

        if init.method.is_none() {
            init.method = Some(original.method);
        }
        if init.headers.is_none() {
            init.headers = Some(original.headers.clone());
        }
        if init.body.is_none() {
            if let Some(bytes) = original.body.clone() {
                let content_type = original.headers.content_type().unwrap_or_default();
                init.body = Some(if looks_textual(content_type) {
                    Body::Text(String::from_utf8_lossy(&bytes).into_owned())
                } else {
                    Body::Blob(Blob::new(content_type, bytes))
                });
            }
        }
        Ok(Request::from_init(&base, input, init)?)
    }

    fn write_body(&self, bytes: Vec<u8>, default_type: &str) {
        let mut state = self.inner.state.lock();
        if !state.headers.contains("content-type") {
            state.headers.set("content-type", default_type);
        }
        state.body = Some(bytes);
    }

    fn deliver(&self, outcome: Outcome) -> Result<(), RouterError> {
        let sender = self
            .inner
            .state
            .lock()
            .sender
            .take()
            .ok_or(RouterError::AlreadySent)?;
        if sender.send(outcome).is_err() {
            tracing::debug!(url = %self.inner.request.url, "response delivered after the request was dropped");
        }
        Ok(())
    }
}

fn looks_textual(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("text/") || content_type.contains("form")
}

impl fmt::Debug for MockerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MockerResponse")
            .field("url", &self.inner.request.url)
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("finished", &state.sender.is_none())
            .finish()
    }
}

/// Resolve with whatever the builder delivers, or `Abandoned` when it is
/// dropped unfinished
fn pending_response(rx: oneshot::Receiver<Outcome>, url: String) -> ResponseFuture {
    Box::pin(async move { rx.await.unwrap_or(Err(NetworkError::Abandoned(url))) })
}
