//! Unit tests for clients, servers and the client registry

mod test_registry;
mod test_storage;

use parking_lot::Mutex;
use std::sync::Arc;

use core_types::Response;
use router::literal;
use service_mocker::{create_server, Server};
use web_platform::{Browser, StaticNetwork};

/// A browser whose network only knows `/`
pub(crate) fn browser() -> (Browser, Arc<StaticNetwork>) {
    browser_with(Browser::builder())
}

pub(crate) fn browser_with(builder: web_platform::BrowserBuilder) -> (Browser, Arc<StaticNetwork>) {
    let network = Arc::new(StaticNetwork::new().with_route("/", Response::new(200, b"network".to_vec())));
    (builder.network(network.clone()).build(), network)
}

/// Serve a mock server script at `/sw.js` answering `GET /api`. Every
/// server the script creates is collected in the returned list.
pub(crate) fn define_server(browser: &Browser) -> Arc<Mutex<Vec<Server>>> {
    let servers = Arc::new(Mutex::new(Vec::new()));
    let collected = servers.clone();
    browser.scripts().define("/sw.js", move |scope| {
        let server = create_server(scope, "/").unwrap();
        server.router().get("/api", literal("Hello new world!")).unwrap();
        collected.lock().push(server);
    });
    servers
}

/// Let queued message deliveries run
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
