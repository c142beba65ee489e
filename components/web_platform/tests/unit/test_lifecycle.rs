use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use core_types::{RequestInit, Response};
use messaging::EventType;
use web_platform::{
    Browser, PlatformError, RegistrationOptions, ScopeEvent, ServiceWorkerState, StaticNetwork,
};

fn browser_with_network() -> (Browser, Arc<StaticNetwork>) {
    let network = Arc::new(
        StaticNetwork::new().with_route("/", Response::new(200, b"network root".to_vec())),
    );
    let browser = Browser::builder().network(network.clone()).build();
    (browser, network)
}

/// Worker answering `/hello` from its fetch listener
fn define_hello_worker(browser: &Browser, body: &'static str) {
    browser.scripts().define("/sw.js", move |scope| {
        scope.on(EventType::Fetch, move |event| {
            if let ScopeEvent::Fetch(fetch) = event {
                if fetch.request().url.ends_with("/hello") {
                    fetch.respond(Response::new(200, body.as_bytes().to_vec())).unwrap();
                }
            }
        });
    });
}

#[tokio::test]
async fn test_register_and_activate() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let window = browser.open_window("https://example.com/").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let log = events.clone();
    browser.scripts().define("/sw.js", move |scope| {
        for ty in [EventType::Install, EventType::Activate] {
            let log = log.clone();
            scope.on(ty.clone(), move |_| log.lock().push(ty.to_string()));
        }
    });

    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    assert_eq!(registration.scope(), "https://example.com/");
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();

    assert_eq!(registration.active().unwrap().id(), worker.id());
    assert_eq!(*events.lock(), vec!["install", "activate"]);
    // registration alone does not take control of an open page
    assert!(window.controller().is_none());
}

#[tokio::test]
async fn test_register_same_script_twice_reuses_registration() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let window = browser.open_window("https://example.com/app/").unwrap();
    let a = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let b = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(a.newest_worker().unwrap().id(), b.newest_worker().unwrap().id());
    assert_eq!(window.container().get_registrations().len(), 1);
}

#[tokio::test]
async fn test_insecure_context_is_rejected() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let window = browser.open_window("http://example.com/").unwrap();
    assert!(!window.container().is_supported());
    let err = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap_err();
    assert!(matches!(err, PlatformError::Security(_)));
}

#[tokio::test]
async fn test_disabled_service_workers() {
    let browser = Browser::builder().service_workers(false).build();
    let window = browser.open_window("https://example.com/").unwrap();
    let err = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap_err();
    assert!(matches!(err, PlatformError::Unsupported));
}

#[tokio::test]
async fn test_missing_script() {
    let (browser, _) = browser_with_network();
    let window = browser.open_window("https://example.com/").unwrap();
    let err = window
        .container()
        .register("/nope.js", RegistrationOptions::default())
        .unwrap_err();
    assert!(matches!(err, PlatformError::ScriptNotFound(_)));
}

#[tokio::test]
async fn test_claim_controls_page_and_routes_fetch() {
    let (browser, network) = browser_with_network();
    define_hello_worker(&browser, "from worker");
    let window = browser.open_window("https://example.com/").unwrap();

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    window
        .container()
        .on(EventType::ControllerChange, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();

    let claimed = worker.scope().clients().unwrap().claim().unwrap();
    assert_eq!(claimed, 1);
    assert_eq!(window.controller().unwrap().id(), worker.id());
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    let handled = window.fetch("/hello", RequestInit::new()).await.unwrap();
    assert_eq!(handled.text().unwrap(), "from worker");
    assert_eq!(network.hits("/hello"), 0);

    let passthrough = window.fetch("/", RequestInit::new()).await.unwrap();
    assert_eq!(passthrough.text().unwrap(), "network root");
    assert_eq!(network.hits("/"), 1);

    // pages opened later start out controlled
    let second = browser.open_window("https://example.com/other").unwrap();
    assert_eq!(second.controller().unwrap().id(), worker.id());
}

#[tokio::test]
async fn test_update_replaces_worker_and_moves_control() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "v1");
    let window = browser.open_window("https://example.com/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let first = registration.newest_worker().unwrap();
    first.wait_for(ServiceWorkerState::Activated).await.unwrap();
    first.scope().clients().unwrap().claim().unwrap();

    assert!(registration.update().unwrap().is_none());

    define_hello_worker(&browser, "v2");
    let second = registration.update().unwrap().expect("new worker");
    assert_ne!(second.id(), first.id());
    second.wait_for(ServiceWorkerState::Activated).await.unwrap();

    assert_eq!(first.state(), ServiceWorkerState::Redundant);
    assert_eq!(window.controller().unwrap().id(), second.id());
    let response = window.fetch("/hello", RequestInit::new()).await.unwrap();
    assert_eq!(response.text().unwrap(), "v2");
}

#[tokio::test]
async fn test_unregister_releases_pages() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let window = browser.open_window("https://example.com/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();
    worker.scope().clients().unwrap().claim().unwrap();

    assert!(registration.unregister());
    assert!(!registration.unregister());
    assert!(window.controller().is_none());
    assert_eq!(worker.state(), ServiceWorkerState::Redundant);
    assert!(window.container().get_registration(None).is_none());
    assert!(registration.update().is_err());
    assert!(worker.wait_for(ServiceWorkerState::Activated).await.is_err());
}

#[tokio::test]
async fn test_scope_limits_clients() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let inside = browser.open_window("https://example.com/app/page").unwrap();
    let outside = browser.open_window("https://example.com/other").unwrap();
    let registration = inside
        .container()
        .register("/sw.js", RegistrationOptions::with_scope("/app/"))
        .unwrap();
    assert_eq!(registration.scope(), "https://example.com/app/");
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();

    let worker_scope = worker.scope();
    let clients = worker_scope.clients().unwrap();
    let matched = clients.match_all();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id(), inside.id());
    assert!(clients.get(outside.id()).is_none());
}

#[tokio::test]
async fn test_terminated_worker_restarts_on_next_event() {
    let (browser, network) = browser_with_network();
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    browser.scripts().define("/sw.js", move |scope| {
        counter.fetch_add(1, Ordering::SeqCst);
        scope.on(EventType::Fetch, |event| {
            if let ScopeEvent::Fetch(fetch) = event {
                fetch.respond(Response::new(200, b"from worker".to_vec())).unwrap();
            }
        });
    });
    let window = browser.open_window("https://example.com/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();
    worker.scope().clients().unwrap().claim().unwrap();
    let first_scope = worker.scope();
    assert_eq!(first_scope.incarnation(), 0);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    assert!(worker.terminate());
    assert!(!worker.is_running());
    assert!(!worker.terminate());
    assert_eq!(worker.state(), ServiceWorkerState::Activated);
    assert_eq!(window.controller().unwrap().id(), worker.id());

    let response = window.fetch("/anything", RequestInit::new()).await.unwrap();
    assert_eq!(response.text().unwrap(), "from worker");
    assert_eq!(network.hits("/anything"), 0);
    assert!(worker.is_running());
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);

    let second_scope = worker.scope();
    assert_eq!(second_scope.incarnation(), 1);
    assert!(!second_scope.ptr_eq(&first_scope));
    let controlled = second_scope.clients().unwrap().controlled();
    assert_eq!(controlled.len(), 1);
    assert_eq!(controlled[0].id(), window.id());
}

#[tokio::test]
async fn test_redundant_worker_is_not_restarted() {
    let (browser, _) = browser_with_network();
    define_hello_worker(&browser, "hi");
    let window = browser.open_window("https://example.com/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();

    assert!(registration.unregister());
    assert!(!worker.terminate());
    assert!(worker.is_running());
    assert_eq!(worker.scope().incarnation(), 0);
}
