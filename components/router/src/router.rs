//! Route registration and first-match dispatch.

use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use url::Url;

use crate::{CompiledPattern, MockerRequest, MockerResponse, ResponseBody, RouterError, RouterList, RoutePattern};
use core_types::Method;
use web_platform::{FetchEvent, GlobalScope, Origin, Transport};

/// A route handler.
///
/// Returning an error logs it and, if the handler had not finished the
/// response, answers `500` with the error text.
pub type Handler = Arc<dyn Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync>;

/// A handler answering every request with the same body
pub fn literal(
    body: impl Into<ResponseBody>,
) -> impl Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static {
    let body = body.into();
    move |_, res| res.send(body.clone())
}

struct Rule {
    /// `None` matches every method
    method: Option<Method>,
    pattern: CompiledPattern,
    handler: Handler,
}

impl Rule {
    fn accepts(&self, method: Method) -> bool {
        self.method.map_or(true, |m| m == method)
    }
}

struct RouterInner {
    origin: Origin,
    /// Path prefix without trailing slash, empty for the root
    base_path: String,
    base_url: String,
    rules: RwLock<Vec<Arc<Rule>>>,
    list: Weak<RouterList>,
}

/// Routes intercepted requests under one base URL.
///
/// Rules are tried in registration order and the first one whose method
/// and pattern match handles the request.
///
/// # Examples
///
/// ```no_run
/// # fn demo(scope: &web_platform::GlobalScope) -> Result<(), router::RouterError> {
/// use router::{literal, Router};
///
/// let router = Router::new(scope, "/api")?;
/// router
///     .get("/users/:id", |req, res| {
///         let id = req.param("id").unwrap_or_default().to_string();
///         res.json(&serde_json::json!({ "id": id }))
///     })?
///     .get("/health", literal("ok"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router for `base_url`, resolved against the scope's
    /// location, and append it to the scope's router list
    pub fn new(scope: &GlobalScope, base_url: &str) -> Result<Self, RouterError> {
        let url = scope.location().join(base_url)?;
        let list = RouterList::for_scope(scope);
        let router = Self::bound(&url, Arc::downgrade(&list))?;
        list.push(router.clone());
        tracing::debug!(base_url = %router.base_url(), "router created");
        Ok(router)
    }

    fn bound(url: &Url, list: Weak<RouterList>) -> Result<Self, RouterError> {
        let origin = Origin::from_url(url)?;
        let base_path = url.path().trim_end_matches('/').to_string();
        let base_url = format!("{}{}", origin.serialize(), base_path);
        Ok(Self {
            inner: Arc::new(RouterInner {
                origin,
                base_path,
                base_url,
                rules: RwLock::new(Vec::new()),
                list,
            }),
        })
    }

    /// The absolute base URL this router is bound to
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Origin of the base URL
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.inner.rules.read().len()
    }

    /// Whether no rule has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a rule. `None` matches every method.
    pub fn register<F>(&self, method: Option<Method>, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        let pattern = CompiledPattern::compile(&path.into())?;
        tracing::trace!(method = ?method, pattern = pattern.source(), base_url = %self.base_url(), "route registered");
        self.inner.rules.write().push(Arc::new(Rule {
            method,
            pattern,
            handler: Arc::new(handler),
        }));
        Ok(self)
    }

    /// Handle requests of any method
    pub fn all<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(None, path, handler)
    }

    /// Handle GET requests
    pub fn get<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Get), path, handler)
    }

    /// Handle HEAD requests
    pub fn head<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Head), path, handler)
    }

    /// Handle POST requests
    pub fn post<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Post), path, handler)
    }

    /// Handle PUT requests
    pub fn put<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Put), path, handler)
    }

    /// Handle PATCH requests
    pub fn patch<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Patch), path, handler)
    }

    /// Handle DELETE requests
    pub fn delete<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Delete), path, handler)
    }

    /// Handle OPTIONS requests
    pub fn options<F>(&self, path: impl Into<RoutePattern>, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.register(Some(Method::Options), path, handler)
    }

    /// A child router bound to `base_url + path`, consulted after this one
    pub fn scope(&self, path: &str) -> Result<Router, RouterError> {
        let base = Url::parse(&format!("{}/", self.base_url()))?;
        let url = base.join(path.trim_start_matches('/'))?;
        let child = Self::bound(&url, self.inner.list.clone())?;
        if let Some(list) = self.inner.list.upgrade() {
            list.push(child.clone());
        }
        Ok(child)
    }

    /// Register several methods on one path
    pub fn route(&self, path: impl Into<RoutePattern>) -> RouteBuilder<'_> {
        RouteBuilder {
            router: self,
            pattern: path.into(),
        }
    }

    /// Path of `url` relative to the base path, if `url` is under this
    /// router's base URL. The base path, like route patterns, is compared
    /// case-insensitively.
    fn relative_path(&self, url: &Url) -> Option<String> {
        let origin = Origin::from_url(url).ok()?;
        if !origin.is_same_origin(&self.inner.origin) {
            return None;
        }
        let rest = strip_prefix_ignore_case(url.path(), &self.inner.base_path)?;
        match rest {
            "" => Some("/".to_string()),
            rest if rest.starts_with('/') => Some(rest.to_string()),
            _ => None,
        }
    }

    /// Try to handle `event`. Returns whether a rule matched.
    pub fn dispatch(&self, event: &FetchEvent, native_fetch: &Arc<dyn Transport>) -> bool {
        let request = event.request();
        let Ok(url) = Url::parse(&request.url) else {
            return false;
        };
        let Some(path) = self.relative_path(&url) else {
            return false;
        };

        let rules = self.inner.rules.read().clone();
        for rule in rules.iter().filter(|r| r.accepts(request.method)) {
            let Some(raw_params) = rule.pattern.captures(&path) else {
                continue;
            };
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                pattern = rule.pattern.source(),
                "route matched"
            );

            let native = Arc::new(request.clone());
            let (res, pending) = MockerResponse::new(Arc::clone(&native), Arc::clone(native_fetch));
            if let Err(err) = event.respond_with(pending) {
                tracing::warn!(url = %request.url, error = %err, "request already answered");
                return true;
            }
            let req = MockerRequest::new(
                native,
                url.path().to_string(),
                url.query().unwrap_or_default(),
                raw_params,
                self.base_url().to_string(),
            );
            if let Err(err) = (rule.handler)(req, res.clone()) {
                tracing::error!(url = %request.url, error = %err, "route handler failed");
                if !res.is_finished() {
                    if let Err(send_err) = res.status(500).content_type("text").send(err.to_string()) {
                        tracing::debug!(url = %request.url, error = %send_err, "error response not delivered");
                    }
                }
            }
            return true;
        }
        false
    }
}

fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    path.get(prefix.len()..)
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("base_url", &self.inner.base_url)
            .field("rules", &self.len())
            .finish()
    }
}

/// Chainable registration of several methods on one path
pub struct RouteBuilder<'a> {
    router: &'a Router,
    pattern: RoutePattern,
}

macro_rules! route_method {
    ($($name:ident => $method:expr),* $(,)?) => {
        $(
            #[doc = concat!("Register `", stringify!($name), "` on this path")]
            pub fn $name<F>(&self, handler: F) -> Result<&Self, RouterError>
            where
                F: Fn(MockerRequest, MockerResponse) -> Result<(), RouterError> + Send + Sync + 'static,
            {
                self.router.register($method, self.pattern.clone(), handler)?;
                Ok(self)
            }
        )*
    };
}

impl RouteBuilder<'_> {
    route_method! {
        all => None,
        get => Some(Method::Get),
        head => Some(Method::Head),
        post => Some(Method::Post),
        put => Some(Method::Put),
        patch => Some(Method::Patch),
        delete => Some(Method::Delete),
        options => Some(Method::Options),
    }
}
