//! Normalized request representation.

use serde::de::DeserializeOwned;
use url::Url;

use crate::{Body, CoreError, Headers, Method};

/// A request as seen by the interception layer and the router.
///
/// The URL is always absolute. Headers are an owned copy of whatever the
/// caller supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body, `None` for GET/HEAD
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a new request without headers or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Build a request from a possibly relative input resolved against `base`.
    ///
    /// The body is dropped for GET/HEAD, and a body's implied content type is
    /// only applied when the caller did not set one.
    pub fn from_init(base: &Url, input: &str, init: RequestInit) -> Result<Self, CoreError> {
        let url = base
            .join(input)
            .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", input, e)))?;
        let method = init.method.unwrap_or_default();
        let mut request = Request::new(method, url.to_string());
        if let Some(headers) = init.headers {
            request.headers = headers;
        }
        if let Some(body) = init.body {
            if method.allows_body() {
                request.set_body(body);
            }
        }
        Ok(request)
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Attach a body (builder style)
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body.into());
        self
    }

    /// Attach a body, filling in its implied content type if unset
    pub fn set_body(&mut self, body: Body) {
        let (bytes, content_type) = body.into_parts();
        if let Some(content_type) = content_type {
            if !self.headers.contains("content-type") {
                self.headers.set("content-type", content_type);
            }
        }
        self.body = Some(bytes);
    }

    /// Parse the URL
    pub fn parsed_url(&self) -> Result<Url, CoreError> {
        Url::parse(&self.url).map_err(|e| CoreError::InvalidUrl(format!("{}: {}", self.url, e)))
    }

    /// Body bytes (empty when there is no body)
    pub fn bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    /// Body decoded as UTF-8 text
    pub fn text(&self) -> Result<String, CoreError> {
        String::from_utf8(self.bytes().to_vec()).map_err(|e| CoreError::InvalidText(e.to_string()))
    }

    /// Body parsed as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_slice(self.bytes()).map_err(|e| CoreError::InvalidJson(e.to_string()))
    }
}

/// Options accepted alongside a request input, mirroring `fetch(input, init)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    /// Method override (defaults to GET)
    pub method: Option<Method>,
    /// Header override
    pub headers: Option<Headers>,
    /// Body override
    pub body: Option<Body>,
}

impl RequestInit {
    /// Create empty init options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set a single header
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).set(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }
}
