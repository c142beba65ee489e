//! Request façade handed to route handlers.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::pattern::RawParams;
use crate::query::parse_query;
use crate::RouterError;
use core_types::{decode_uri_component, Blob, Headers, Method, Request, FORM_MIME, OCTET_STREAM};

/// An intercepted request as seen by a route handler.
///
/// Cloning is cheap: the native request is shared, the derived fields are
/// rebuilt from the same route match.
#[derive(Debug, Clone)]
pub struct MockerRequest {
    request: Arc<Request>,
    path: String,
    query: Value,
    params: HashMap<String, Option<String>>,
    base_url: String,
}

impl MockerRequest {
    /// Build the façade for a matched route.
    ///
    /// A parameter that fails to percent-decode is logged and exposed as
    /// `None`.
    pub fn new(request: Arc<Request>, path: String, query: &str, raw_params: RawParams, base_url: String) -> Self {
        let params = raw_params
            .into_iter()
            .map(|(name, raw)| {
                let decoded = raw.and_then(|raw| match decode_uri_component(&raw) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        tracing::error!(param = %name, error = %err, "failed to decode route parameter");
                        None
                    }
                });
                (name, decoded)
            })
            .collect();

        Self {
            request,
            path,
            query: parse_query(query),
            params,
            base_url,
        }
    }

    /// The native request
    pub fn native(&self) -> &Request {
        &self.request
    }

    /// HTTP method
    pub fn method(&self) -> Method {
        self.request.method
    }

    /// Absolute request URL
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// Path of the request URL, without origin or query
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parsed query string
    pub fn query(&self) -> &Value {
        &self.query
    }

    /// Route parameters. A parameter that did not participate in the
    /// match, or could not be decoded, is `None`.
    pub fn params(&self) -> &HashMap<String, Option<String>> {
        &self.params
    }

    /// A single route parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_deref())
    }

    /// Base URL of the router that matched
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request headers
    pub fn headers(&self) -> &Headers {
        &self.request.headers
    }

    /// A single request header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name)
    }

    /// Body as UTF-8 text
    pub fn text(&self) -> Result<String, RouterError> {
        Ok(self.request.text()?)
    }

    /// Body parsed as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        Ok(self.request.json()?)
    }

    /// Raw body bytes
    pub fn array_buffer(&self) -> Vec<u8> {
        self.request.bytes().to_vec()
    }

    /// Body as a blob typed with the request's content type
    pub fn blob(&self) -> Blob {
        let content_type = self.header("content-type").unwrap_or(OCTET_STREAM);
        Blob::new(content_type, self.request.bytes())
    }

    /// Fields of a url-encoded form body
    pub fn form_data(&self) -> Result<Vec<(String, String)>, RouterError> {
        let content_type = self.header("content-type").unwrap_or_default();
        if !content_type.to_ascii_lowercase().starts_with(FORM_MIME) {
            return Err(RouterError::UnsupportedContentType {
                accessor: "form_data",
                content_type: content_type.to_string(),
            });
        }
        Ok(url::form_urlencoded::parse(self.request.bytes())
            .into_owned()
            .collect())
    }
}
