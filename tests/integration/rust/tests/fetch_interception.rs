//! Fetch Interception Integration Tests
//!
//! Pages issue `fetch` calls that are answered by routes registered in a
//! server script, either from a service worker or, in legacy mode, from
//! the page itself.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use core_types::{Method, RequestInit};
use integration_tests::{modes, MockedPage};
use router::{literal, RouterError};
use service_mocker::{create_server, ClientOptions};

#[tokio::test]
async fn test_hello_new_world() {
    for options in modes() {
        let legacy = options.force_legacy;
        let page = MockedPage::connect("https://app.test/", options, |scope| {
            let server = create_server(scope, "/").unwrap();
            server
                .router()
                .get("/api", |_, res| res.send("Hello new world!"))
                .unwrap();
        })
        .await;

        assert_eq!(page.client.is_legacy(), legacy);
        assert_eq!(page.get("/api").await, (200, "Hello new world!".to_string()));
        assert_eq!(page.network.hits("/api"), 0);
    }
}

#[tokio::test]
async fn test_first_registered_route_wins() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, |scope| {
            let server = create_server(scope, "/").unwrap();
            server
                .router()
                .get("/user", |_, res| res.json(&json!({ "id": 1 })))
                .unwrap()
                .get("/user", |_, res| res.json(&json!({ "id": 2 })))
                .unwrap();
        })
        .await;

        let (status, body) = page.get("/user").await;
        assert_eq!(status, 200);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["id"], 1);
    }
}

#[tokio::test]
async fn test_response_is_sent_at_most_once() {
    let second: Arc<Mutex<Option<RouterError>>> = Arc::new(Mutex::new(None));
    let seen = second.clone();
    let page = MockedPage::connect("https://app.test/", ClientOptions::default(), move |scope| {
        let server = create_server(scope, "/").unwrap();
        let seen = seen.clone();
        server
            .router()
            .get("/once", move |_, res| {
                res.send("first")?;
                if let Err(err) = res.send("second") {
                    *seen.lock() = Some(err);
                }
                Ok(())
            })
            .unwrap();
    })
    .await;

    assert_eq!(page.get("/once").await, (200, "first".to_string()));
    assert!(matches!(*second.lock(), Some(RouterError::AlreadySent)));
}

#[tokio::test]
async fn test_router_scoped_to_base_url() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, |scope| {
            let server = create_server(scope, "/api/v1").unwrap();
            server.router().get("/users", literal("v1 users")).unwrap();
        })
        .await;

        assert_eq!(page.get("/api/v1/users").await, (200, "v1 users".to_string()));
        assert_eq!(page.get("/other").await.0, 404);
        assert_eq!(page.get("/api/v10/users").await.0, 404);
        assert_eq!(page.get("https://elsewhere.test/api/v1/users").await.0, 404);
        assert_eq!(page.network.hits("/other"), 1);
        let to_network: Vec<String> = page
            .network
            .requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/api/v1/users"))
            .map(|r| r.url)
            .collect();
        assert_eq!(to_network, vec!["https://elsewhere.test/api/v1/users".to_string()]);
    }
}

#[tokio::test]
async fn test_route_parameters() {
    let page = MockedPage::connect("https://app.test/", ClientOptions::default(), |scope| {
        let server = create_server(scope, "/").unwrap();
        server
            .router()
            .get("/:user", |req, res| res.json(&json!({ "user": req.param("user") })))
            .unwrap();
    })
    .await;

    let (_, body) = page.get("/dolphin").await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "user": "dolphin" }));

    let (status, body) = page.get("/%E0%A4%A").await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "user": null }));
}

#[tokio::test]
async fn test_head_and_bodyless_statuses_are_empty() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, |scope| {
            let server = create_server(scope, "/").unwrap();
            server
                .router()
                .head("/head", |_, res| res.send("not sent"))
                .unwrap()
                .get("/empty", |_, res| res.status(204).send("not sent either"))
                .unwrap();
        })
        .await;

        let response = page
            .window
            .fetch("/head", RequestInit::new().method(Method::Head))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text().unwrap(), "");

        assert_eq!(page.get("/empty").await, (204, String::new()));
    }
}

#[tokio::test]
async fn test_forward_reaches_the_network_once() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, |scope| {
            let server = create_server(scope, "/").unwrap();
            server
                .router()
                .get("/forward", |_, res| res.forward(Some("/"), RequestInit::new()))
                .unwrap()
                .get("/loop", |_, res| res.forward(None, RequestInit::new()))
                .unwrap();
        })
        .await;

        let direct = page.get("/").await;
        assert_eq!(page.get("/forward").await, direct);
        assert_eq!(page.network.hits("/"), 2);
        assert_eq!(page.network.hits("/forward"), 0);

        // forwarding a request to itself is not intercepted again
        assert_eq!(page.get("/loop").await.0, 404);
        assert_eq!(page.network.hits("/loop"), 1);
    }
}

#[tokio::test]
async fn test_handler_error_becomes_server_error() {
    let page = MockedPage::connect("https://app.test/", ClientOptions::default(), |scope| {
        let server = create_server(scope, "/").unwrap();
        server
            .router()
            .get("/broken", |_, _| Err(RouterError::handler("database unavailable")))
            .unwrap();
    })
    .await;

    assert_eq!(page.get("/broken").await, (500, "database unavailable".to_string()));
}

#[tokio::test]
async fn test_nested_query_reaches_handler() {
    let page = MockedPage::connect("https://app.test/", ClientOptions::default(), |scope| {
        let server = create_server(scope, "/").unwrap();
        server
            .router()
            .get("/search", |req, res| res.json(req.query()))
            .unwrap();
    })
    .await;

    let (_, body) = page.get("/search?user[name]=x&tags[]=a&tags[]=b").await;
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({ "user": { "name": "x" }, "tags": ["a", "b"] })
    );
}

#[tokio::test]
async fn test_post_body_reaches_handler() {
    let page = MockedPage::connect("https://app.test/", ClientOptions::default(), |scope| {
        let server = create_server(scope, "/").unwrap();
        server
            .router()
            .post("/echo", |req, res| {
                let body: Value = req.json()?;
                res.status(201).json(&json!({ "received": body }))
            })
            .unwrap();
    })
    .await;

    let response = page
        .window
        .fetch(
            "/echo",
            RequestInit::new()
                .method(Method::Post)
                .header("content-type", "application/json")
                .body(r#"{"name":"dolphin"}"#),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(
        serde_json::from_str::<Value>(&response.text().unwrap()).unwrap(),
        json!({ "received": { "name": "dolphin" } })
    );
}
