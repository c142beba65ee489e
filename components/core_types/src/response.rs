//! Native response representation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{CoreError, Headers};

/// Response types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    Basic,
    Cors,
    Default,
    Error,
    Opaque,
    OpaqueRedirect,
}

/// A response produced either by the network or synthesized by a route
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Response status code
    pub status: u16,
    /// Status text
    pub status_text: String,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Vec<u8>,
    /// Response URL
    pub url: String,
    /// Whether the response was redirected
    pub redirected: bool,
    /// Response type
    pub response_type: ResponseType,
}

impl Response {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: Headers::new(),
            body: body.into(),
            response_type: ResponseType::Default,
            url: String::new(),
            redirected: false,
        }
    }

    /// Create an error response
    pub fn error() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            response_type: ResponseType::Error,
            url: String::new(),
            redirected: false,
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Set the response URL (builder style)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Check if the response is OK (status 200-299)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `content-type` header, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    /// Body decoded as UTF-8 text
    pub fn text(&self) -> Result<String, CoreError> {
        String::from_utf8(self.body.clone()).map_err(|e| CoreError::InvalidText(e.to_string()))
    }

    /// Body parsed as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_slice(&self.body).map_err(|e| CoreError::InvalidJson(e.to_string()))
    }
}

/// Statuses whose responses never carry a body
pub fn is_null_body_status(status: u16) -> bool {
    matches!(status, 101 | 204 | 205 | 304)
}

/// Get status text for common status codes
pub fn status_text(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        418 => "I'm a teapot",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
