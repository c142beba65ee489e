//! The router side of a connection.

use std::sync::Arc;

use crate::{ClientRegistry, ServerError, ServerOptions, Storage};
use messaging::{EventType, ExecutionContext};
use router::{Router, RouterList};
use web_platform::{GlobalScope, ScopeEvent};

/// Listeners a context needs once, however many servers it creates
struct ServerRuntime {
    registry: Arc<ClientRegistry>,
}

impl ServerRuntime {
    fn for_scope(scope: &GlobalScope) -> Arc<ServerRuntime> {
        scope.singleton(|| ServerRuntime::install(scope))
    }

    fn install(scope: &GlobalScope) -> Self {
        let registry = ClientRegistry::for_scope(scope);

        {
            let registry = Arc::clone(&registry);
            scope.on(EventType::Message, move |event| {
                if let ScopeEvent::Message(message) = event {
                    registry.on_message(message);
                }
            });
        }
        {
            let registry = Arc::clone(&registry);
            let weak = scope.downgrade();
            scope.on(EventType::Fetch, move |event| {
                let ScopeEvent::Fetch(fetch) = event else {
                    return;
                };
                let Some(scope) = weak.upgrade() else {
                    return;
                };
                if !registry.has(fetch.client_id()) {
                    tracing::debug!(
                        client = %fetch.client_id(),
                        url = %fetch.request().url,
                        "request from a client that is not connected"
                    );
                    return;
                }
                RouterList::for_scope(&scope).dispatch(fetch, &scope.native_fetch());
            });
        }

        tracing::debug!(context = %scope.context(), location = %scope.location(), "server runtime installed");
        Self { registry }
    }
}

/// A router plus storage living in a worker or, in legacy mode, a page.
///
/// Every server of a context shares the context's client registry and
/// router list; requests are routed only for connected pages.
#[derive(Clone, Debug)]
pub struct Server {
    router: Router,
    storage: Storage,
    context: ExecutionContext,
}

impl Server {
    /// Create a server in `scope`
    pub fn new(scope: &GlobalScope, options: ServerOptions) -> Result<Self, ServerError> {
        let runtime = ServerRuntime::for_scope(scope);
        let router = Router::new(scope, &options.base_url)?;
        tracing::info!(base_url = %router.base_url(), context = %scope.context(), "server created");
        Ok(Self {
            router,
            storage: Storage::new(Arc::clone(&runtime.registry)),
            context: scope.context(),
        })
    }

    /// The server's root router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Storage bridged to a connected page
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Where the server runs
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Whether the server runs in the page itself
    pub fn is_legacy(&self) -> bool {
        self.context.is_legacy()
    }
}

/// Create a server in `scope` whose router is bound to `base_url`
pub fn create_server(scope: &GlobalScope, base_url: &str) -> Result<Server, ServerError> {
    Server::new(
        scope,
        ServerOptions {
            base_url: base_url.to_string(),
        },
    )
}
