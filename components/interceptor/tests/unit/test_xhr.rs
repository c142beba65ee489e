use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use core_types::{Body, Response};
use interceptor::{FetchInterceptOptions, InterceptError, XhrInterceptor};
use messaging::EventType;
use web_platform::{
    Browser, NativeXhr, PlatformError, ReadyState, ScopeEvent, StaticNetwork, Window, XhrEvent,
    XhrEventKind, XhrResponse, XhrResponseType,
};

fn page() -> (Window, Arc<StaticNetwork>) {
    let network = Arc::new(StaticNetwork::new().with_route(
        "/real",
        Response::new(200, b"from network".to_vec()).with_header("content-type", "text/plain"),
    ));
    let browser = Browser::builder().network(network.clone()).build();
    (browser.open_window("http://example.com/").unwrap(), network)
}

/// Answer every request except `/real`, recording the request bodies
fn answer_with(window: &Window, response: Response) -> Arc<Mutex<Vec<Option<Vec<u8>>>>> {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let log = bodies.clone();
    window.scope().on(EventType::Fetch, move |event| {
        let ScopeEvent::Fetch(fetch) = event else { return };
        if fetch.request().url.ends_with("/real") {
            return;
        }
        log.lock().push(fetch.request().body.clone());
        fetch.respond(response.clone()).unwrap();
    });
    bodies
}

fn record_events(xhr: &Arc<dyn NativeXhr>) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in XhrEventKind::ALL {
        let log = seen.clone();
        xhr.add_event_listener(kind, Arc::new(move |event: &XhrEvent| log.lock().push(event.kind.as_str())));
    }
    seen
}

#[tokio::test]
async fn test_synthetic_response_and_event_order() {
    let (window, network) = page();
    let bodies = answer_with(
        &window,
        Response::new(200, br#"{"ok":true}"#.to_vec()).with_header("content-type", "application/json"),
    );
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/data").unwrap();
    let events = record_events(&xhr);
    xhr.set_response_type(XhrResponseType::Json).unwrap();
    xhr.send(Some(Body::Text("dropped".to_string()))).await.unwrap();

    assert_eq!(
        *events.lock(),
        vec!["readystatechange", "loadstart", "progress", "load", "loadend"]
    );
    assert_eq!(xhr.ready_state(), ReadyState::Done);
    assert_eq!(xhr.status(), 200);
    assert_eq!(xhr.status_text(), "OK");
    assert_eq!(xhr.response(), Some(XhrResponse::Json(json!({"ok": true}))));
    assert_eq!(xhr.response_text(), None);
    assert_eq!(*bodies.lock(), vec![None]);
    assert!(network.requests().is_empty());
    assert!(xhr.set_response_type(XhrResponseType::Text).is_err());
}

/// Answer every request after `delay`
fn answer_late(window: &Window, delay: Duration) {
    window.scope().on(EventType::Fetch, move |event| {
        let ScopeEvent::Fetch(fetch) = event else { return };
        fetch
            .respond_with(async move {
                tokio::time::sleep(delay).await;
                Ok(Response::new(200, b"late".to_vec()))
            })
            .unwrap();
    });
}

#[tokio::test(start_paused = true)]
async fn test_abort_cancels_pending_synthetic_response() {
    let (window, network) = page();
    answer_late(&window, Duration::from_millis(100));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/slow").unwrap();
    let events = record_events(&xhr);
    let sending = {
        let xhr = xhr.clone();
        tokio::spawn(async move { xhr.send(None).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    xhr.abort();
    assert_eq!(*events.lock(), vec!["readystatechange", "abort", "loadend"]);

    sending.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*events.lock(), vec!["readystatechange", "abort", "loadend"]);
    assert_eq!(xhr.ready_state(), ReadyState::Unsent);
    assert_eq!(xhr.status(), 0);
    assert_ne!(xhr.response_text().as_deref(), Some("late"));
    assert!(network.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reopen_discards_pending_synthetic_response() {
    let (window, _) = page();
    answer_late(&window, Duration::from_millis(100));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/slow").unwrap();
    let sending = {
        let xhr = xhr.clone();
        tokio::spawn(async move { xhr.send(None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    xhr.open("GET", "/other").unwrap();
    let events = record_events(&xhr);

    sending.await.unwrap().unwrap();
    assert!(events.lock().is_empty());
    assert_eq!(xhr.ready_state(), ReadyState::Opened);
    assert_eq!(xhr.status(), 0);
}

#[tokio::test]
async fn test_post_body_is_captured() {
    let (window, _) = page();
    let bodies = answer_with(&window, Response::new(201, b"created".to_vec()));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("post", "/items").unwrap();
    xhr.set_request_header("x-trace", "1").unwrap();
    xhr.send(Some(Body::Text("payload".to_string()))).await.unwrap();
    assert_eq!(*bodies.lock(), vec![Some(b"payload".to_vec())]);
    assert_eq!(xhr.response_text().as_deref(), Some("created"));
    assert_eq!(xhr.status(), 201);
}

#[tokio::test]
async fn test_malformed_json_yields_none() {
    let (window, _) = page();
    answer_with(&window, Response::new(200, b"{broken".to_vec()));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/data").unwrap();
    xhr.set_response_type(XhrResponseType::Json).unwrap();
    xhr.send(None).await.unwrap();
    assert_eq!(xhr.response(), None);
}

#[tokio::test]
async fn test_override_mime_and_document() {
    let (window, _) = page();
    answer_with(&window, Response::new(200, b"<list><item/></list>".to_vec()));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/feed").unwrap();
    xhr.override_mime_type("application/xml").unwrap();
    xhr.set_response_type(XhrResponseType::Document).unwrap();
    xhr.send(None).await.unwrap();
    assert_eq!(xhr.get_response_header("Content-Type").as_deref(), Some("application/xml"));
    assert!(xhr.get_all_response_headers().contains("content-type: application/xml\r\n"));
    assert_eq!(xhr.response_xml().unwrap().document_element(), "list");
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_uses_native_xhr() {
    let (window, network) = page();
    answer_with(&window, Response::new(200, b"mocked".to_vec()));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/real").unwrap();
    let events = record_events(&xhr);
    xhr.send(None).await.unwrap();
    assert_eq!(xhr.response_text().as_deref(), Some("from network"));
    assert_eq!(network.hits("/real"), 1);
    assert!(events.lock().contains(&"load"));
    assert_eq!(events.lock().last(), Some(&"loadend"));
}

#[tokio::test]
async fn test_send_requires_open() {
    let (window, _) = page();
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();
    let xhr = window.xml_http_request();
    assert!(matches!(xhr.send(None).await, Err(PlatformError::XhrState(_))));
}

#[tokio::test]
async fn test_listener_removal() {
    let (window, _) = page();
    answer_with(&window, Response::new(200, Vec::new()));
    let _patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();

    let xhr = window.xml_http_request();
    let loads = Arc::new(Mutex::new(0));
    let counter = loads.clone();
    let id = xhr.add_event_listener(XhrEventKind::Load, Arc::new(move |_: &XhrEvent| *counter.lock() += 1));
    assert!(xhr.remove_event_listener(XhrEventKind::Load, id));
    xhr.open("GET", "/a").unwrap();
    xhr.send(None).await.unwrap();
    assert_eq!(*loads.lock(), 0);
}

#[tokio::test]
async fn test_uninstall_restores_native_xhr() {
    let (window, network) = page();
    answer_with(&window, Response::new(200, b"mocked".to_vec()));
    let patch = XhrInterceptor::install(&window, FetchInterceptOptions::default()).unwrap();
    assert!(matches!(
        XhrInterceptor::install(&window, FetchInterceptOptions::default()),
        Err(InterceptError::AlreadyInstalled(_))
    ));
    patch.uninstall().unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/mock-me").unwrap();
    xhr.send(None).await.unwrap();
    assert_eq!(xhr.status(), 404);
    assert_eq!(network.hits("/mock-me"), 1);
}
