//! XMLHttpRequest Integration Tests
//!
//! XHR objects created by the page are answered by the same routes as
//! `fetch`, with the response decoded according to `responseType`.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use core_types::Body;
use integration_tests::{modes, MockedPage};
use service_mocker::create_server;
use web_platform::{NativeXhr, XhrEvent, XhrEventKind, XhrResponse, XhrResponseType};

fn setup(scope: &web_platform::GlobalScope) {
    let server = create_server(scope, "/").unwrap();
    server
        .router()
        .get("/user", |_, res| res.json(&json!({ "name": "dolphin" })))
        .unwrap()
        .get("/broken-json", |_, res| res.content_type("json").send("{not json"))
        .unwrap()
        .post("/echo", |req, res| res.send(req.text()?))
        .unwrap();
}

#[tokio::test]
async fn test_json_response_type() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, setup).await;
        let xhr = page.window.xml_http_request();
        xhr.open("GET", "/user").unwrap();
        xhr.set_response_type(XhrResponseType::Json).unwrap();
        xhr.send(None).await.unwrap();

        assert_eq!(xhr.status(), 200);
        match xhr.response() {
            Some(XhrResponse::Json(value)) => assert_eq!(value, json!({ "name": "dolphin" })),
            other => panic!("unexpected response {other:?}"),
        }
        assert!(xhr
            .get_response_header("content-type")
            .unwrap()
            .starts_with("application/json"));
        assert_eq!(page.network.hits("/user"), 0);
    }
}

#[tokio::test]
async fn test_malformed_json_is_null() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, setup).await;
        let xhr = page.window.xml_http_request();
        xhr.open("GET", "/broken-json").unwrap();
        xhr.set_response_type(XhrResponseType::Json).unwrap();
        xhr.send(None).await.unwrap();

        assert_eq!(xhr.status(), 200);
        assert!(xhr.response().is_none());
    }
}

#[tokio::test]
async fn test_post_body_and_events() {
    for options in modes() {
        let page = MockedPage::connect("https://app.test/", options, setup).await;
        let xhr = page.window.xml_http_request();
        let fired = Arc::new(Mutex::new(Vec::new()));
        for kind in [XhrEventKind::Load, XhrEventKind::LoadEnd] {
            let fired = fired.clone();
            xhr.add_event_listener(kind, Arc::new(move |event: &XhrEvent| fired.lock().push(event.kind)));
        }

        xhr.open("POST", "/echo").unwrap();
        xhr.set_request_header("content-type", "text/plain").unwrap();
        xhr.send(Some(Body::from("hello"))).await.unwrap();

        assert_eq!(xhr.response_text().as_deref(), Some("hello"));
        assert_eq!(*fired.lock(), vec![XhrEventKind::Load, XhrEventKind::LoadEnd]);
    }
}

#[tokio::test]
async fn test_send_before_open_is_rejected() {
    let page = MockedPage::connect("https://app.test/", service_mocker::ClientOptions::legacy(), setup).await;
    let xhr = page.window.xml_http_request();
    assert!(xhr.send(None).await.is_err());
}
