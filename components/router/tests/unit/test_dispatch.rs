use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use core_types::{Method, Request, Response};
use messaging::ClientId;
use router::{literal, Router, RouterError, RouterList};
use web_platform::{Browser, FetchEvent, StaticNetwork, Transport, Window};

fn page() -> (Window, Arc<dyn Transport>) {
    let network: Arc<dyn Transport> =
        Arc::new(StaticNetwork::new().with_route("/", Response::new(200, b"network root".to_vec())));
    let browser = Browser::builder().network(Arc::clone(&network)).build();
    (browser.open_window("https://example.com/").unwrap(), network)
}

/// Offer a request to every router of the window and await the answer
async fn handle(window: &Window, native: &Arc<dyn Transport>, request: Request) -> Option<Response> {
    let (event, receiver) = FetchEvent::new(request, ClientId::legacy());
    let matched = RouterList::for_scope(window.scope()).dispatch(&event, native);
    drop(event);
    let pending = receiver.wait(Duration::ZERO).await;
    assert_eq!(matched, pending.is_some());
    match pending {
        Some(future) => Some(future.await.unwrap()),
        None => None,
    }
}

#[tokio::test]
async fn test_first_registered_rule_wins() {
    let (window, native) = page();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new(window.scope(), "/").unwrap();
    let first = calls.clone();
    let second = calls.clone();
    router
        .get("/user", move |_, res| {
            first.lock().push(1);
            res.json(&json!({"id": 1}))
        })
        .unwrap()
        .get("/user", move |_, res| {
            second.lock().push(2);
            res.json(&json!({"id": 2}))
        })
        .unwrap();

    let response = handle(&window, &native, Request::get("https://example.com/user"))
        .await
        .unwrap();
    assert_eq!(response.json::<Value>().unwrap(), json!({"id": 1}));
    assert_eq!(*calls.lock(), vec![1]);
}

#[tokio::test]
async fn test_params_and_query() {
    let (window, native) = page();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    Router::new(window.scope(), "/")
        .unwrap()
        .get("/:user", move |req, res| {
            log.lock().push((req.params().get("user").cloned().flatten(), req.query().clone()));
            res.end()
        })
        .unwrap();

    handle(&window, &native, Request::get("https://example.com/dolphin?filter[kind]=whale"))
        .await
        .unwrap();
    handle(&window, &native, Request::get("https://example.com/%E0%A4%A"))
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].0.as_deref(), Some("dolphin"));
    assert_eq!(seen[0].1, json!({"filter": {"kind": "whale"}}));
    assert_eq!(seen[1].0, None);
}

#[tokio::test]
async fn test_method_filtering() {
    let (window, native) = page();
    let router = Router::new(window.scope(), "/").unwrap();
    router
        .post("/items", literal("created"))
        .unwrap()
        .all("/any", literal("any"))
        .unwrap();

    assert!(handle(&window, &native, Request::get("https://example.com/items")).await.is_none());
    let created = handle(&window, &native, Request::new(Method::Post, "https://example.com/items"))
        .await
        .unwrap();
    assert_eq!(created.text().unwrap(), "created");
    for method in [Method::Get, Method::Delete, Method::Options] {
        let response = handle(&window, &native, Request::new(method, "https://example.com/any"))
            .await
            .unwrap();
        assert_eq!(response.text().unwrap(), "any");
    }
}

#[tokio::test]
async fn test_head_route_has_empty_body() {
    let (window, native) = page();
    Router::new(window.scope(), "/")
        .unwrap()
        .all("/thing", literal("body"))
        .unwrap();
    let response = handle(&window, &native, Request::new(Method::Head, "https://example.com/thing"))
        .await
        .unwrap();
    assert!(response.body.is_empty());
    assert_eq!(response.content_type(), Some("text/html"));
}

#[tokio::test]
async fn test_failing_handler_answers_500() {
    let (window, native) = page();
    Router::new(window.scope(), "/")
        .unwrap()
        .get("/boom", |_, _| Err(RouterError::handler("exploded")))
        .unwrap();
    let response = handle(&window, &native, Request::get("https://example.com/boom"))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(response.text().unwrap(), "exploded");
}

#[tokio::test]
async fn test_handler_failing_after_sending_keeps_response() {
    let (window, native) = page();
    Router::new(window.scope(), "/")
        .unwrap()
        .get("/partial", |_, res| {
            res.status(201).send("sent")?;
            Err(RouterError::handler("failed afterwards"))
        })
        .unwrap();
    let response = handle(&window, &native, Request::get("https://example.com/partial"))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.text().unwrap(), "sent");
}

#[tokio::test]
async fn test_forward_reaches_network() {
    let (window, native) = page();
    Router::new(window.scope(), "/")
        .unwrap()
        .get("/proxy", |_, res| res.forward(Some("/"), Default::default()))
        .unwrap();
    let response = handle(&window, &native, Request::get("https://example.com/proxy"))
        .await
        .unwrap();
    assert_eq!(response.text().unwrap(), "network root");
}

#[tokio::test]
async fn test_route_builder() {
    let (window, native) = page();
    let router = Router::new(window.scope(), "/").unwrap();
    router
        .route("/user")
        .get(literal("read"))
        .unwrap()
        .put(literal("write"))
        .unwrap();
    assert_eq!(router.len(), 2);

    let read = handle(&window, &native, Request::get("https://example.com/user")).await.unwrap();
    let write = handle(&window, &native, Request::new(Method::Put, "https://example.com/user"))
        .await
        .unwrap();
    assert_eq!(read.text().unwrap(), "read");
    assert_eq!(write.text().unwrap(), "write");
}

#[tokio::test]
async fn test_regex_route() {
    let (window, native) = page();
    Router::new(window.scope(), "/")
        .unwrap()
        .get(regex::Regex::new(r"^/v(\d+)/status$").unwrap(), |req, res| {
            let version = req.param("0").unwrap_or_default().to_string();
            res.send(version)
        })
        .unwrap();
    let response = handle(&window, &native, Request::get("https://example.com/v3/status"))
        .await
        .unwrap();
    assert_eq!(response.text().unwrap(), "3");
}
