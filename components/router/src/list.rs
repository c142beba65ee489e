//! The ordered list of routers living in one execution context.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::Router;
use web_platform::{FetchEvent, GlobalScope, Transport};

/// Every router created in one context, in creation order
#[derive(Debug, Default)]
pub struct RouterList {
    routers: RwLock<Vec<Router>>,
}

impl RouterList {
    /// The list belonging to `scope`
    pub fn for_scope(scope: &GlobalScope) -> Arc<RouterList> {
        scope.singleton(RouterList::default)
    }

    pub(crate) fn push(&self, router: Router) {
        self.routers.write().push(router);
    }

    /// Routers in consultation order
    pub fn routers(&self) -> Vec<Router> {
        self.routers.read().clone()
    }

    /// Number of routers
    pub fn len(&self) -> usize {
        self.routers.read().len()
    }

    /// Whether no router exists yet
    pub fn is_empty(&self) -> bool {
        self.routers.read().is_empty()
    }

    /// Offer `event` to each router until one matches.
    ///
    /// An unmatched event is left unanswered so the request falls through
    /// to the network.
    pub fn dispatch(&self, event: &FetchEvent, native_fetch: &Arc<dyn Transport>) -> bool {
        let matched = self
            .routers()
            .iter()
            .any(|router| router.dispatch(event, native_fetch));
        if !matched {
            tracing::trace!(url = %event.request().url, "no route matched");
        }
        matched
    }
}
