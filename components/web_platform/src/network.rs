//! The "real" network a page or worker falls back to.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::NetworkError;
use core_types::{Request, Response};

/// Something that can answer a request: the network, or a page's patched
/// fetch slot.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request
    async fn fetch(&self, request: Request) -> Result<Response, NetworkError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
        (**self).fetch(request).await
    }
}

/// In-memory network serving canned responses.
///
/// Routes are looked up by full URL first, then by path. Anything else is
/// answered with a 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    routes: RwLock<HashMap<String, Response>>,
    offline: RwLock<bool>,
    log: Mutex<Vec<Request>>,
}

impl StaticNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for a URL or path (builder style)
    pub fn with_route(self, url_or_path: &str, response: Response) -> Self {
        self.route(url_or_path, response);
        self
    }

    /// Serve `response` for a URL or path
    pub fn route(&self, url_or_path: &str, response: Response) {
        self.routes.write().insert(url_or_path.to_string(), response);
    }

    /// Make every request fail
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().clone()
    }

    /// Number of requests seen for a path
    pub fn hits(&self, path: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|r| Url::parse(&r.url).map(|u| u.path() == path).unwrap_or(false))
            .count()
    }

    fn lookup(&self, url: &Url) -> Option<Response> {
        let routes = self.routes.read();
        routes
            .get(url.as_str())
            .or_else(|| routes.get(url.path()))
            .cloned()
    }
}

#[async_trait]
impl Transport for StaticNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
        self.log.lock().push(request.clone());
        tracing::trace!(method = %request.method, url = %request.url, "network request");

        if *self.offline.read() {
            return Err(NetworkError::Failed {
                url: request.url,
                reason: "network is offline".to_string(),
            });
        }

        let url = Url::parse(&request.url).map_err(|e| NetworkError::Failed {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let response = self
            .lookup(&url)
            .unwrap_or_else(|| Response::new(404, b"Not Found".to_vec()).with_header("content-type", "text/plain"));
        Ok(response.with_url(url.as_str()))
    }
}
