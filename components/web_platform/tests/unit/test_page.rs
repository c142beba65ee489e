use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{Request, RequestInit, Response};
use messaging::{EventType, ExecutionContext};
use serde_json::json;
use web_platform::{
    Browser, NetworkError, PlatformError, ReadyState, StaticNetwork, Transport, XhrResponse,
    XhrResponseType,
};

struct Canned(&'static str);

#[async_trait]
impl Transport for Canned {
    async fn fetch(&self, _request: Request) -> Result<Response, NetworkError> {
        Ok(Response::new(200, self.0.as_bytes().to_vec()))
    }
}

#[tokio::test]
async fn test_secure_context_detection() {
    let browser = Browser::new();
    assert!(browser.open_window("https://example.com/").unwrap().is_secure_context());
    assert!(browser.open_window("http://localhost/").unwrap().is_secure_context());
    assert!(!browser.open_window("http://example.com/").unwrap().is_secure_context());
    assert!(browser.open_window("not a url").is_err());
}

#[tokio::test]
async fn test_fetch_slot_can_be_patched_and_restored() {
    let network = Arc::new(StaticNetwork::new().with_route("/", Response::new(200, b"real".to_vec())));
    let browser = Browser::builder().network(network).build();
    let window = browser.open_window("https://example.com/").unwrap();

    let original = window.install_fetch(Arc::new(Canned("patched")));
    let patched = window.fetch("/", RequestInit::new()).await.unwrap();
    assert_eq!(patched.text().unwrap(), "patched");

    // the native fetch is untouched by patching
    let native = window.native_fetch().fetch(Request::get("https://example.com/")).await.unwrap();
    assert_eq!(native.text().unwrap(), "real");

    window.install_fetch(original);
    let restored = window.fetch("/", RequestInit::new()).await.unwrap();
    assert_eq!(restored.text().unwrap(), "real");
}

#[tokio::test]
async fn test_load_script_runs_in_page_scope() {
    let browser = Browser::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    browser.scripts().define("/legacy.js", move |scope| {
        assert_eq!(scope.context(), ExecutionContext::Page);
        assert!(scope.window().is_some());
        assert!(scope.clients().is_none());
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let window = browser.open_window("http://example.com/app/").unwrap();
    window.load_script("/legacy.js").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(matches!(
        window.load_script("/missing.js"),
        Err(PlatformError::ScriptNotFound(_))
    ));
}

#[tokio::test]
async fn test_singletons_live_per_scope() {
    let browser = Browser::new();
    let a = browser.open_window("https://example.com/a").unwrap();
    let b = browser.open_window("https://example.com/b").unwrap();

    struct Counter(AtomicUsize);
    let first = a.scope().singleton(|| Counter(AtomicUsize::new(1)));
    let again = a.scope().singleton(|| Counter(AtomicUsize::new(2)));
    assert!(Arc::ptr_eq(&first, &again));
    let other = b.scope().singleton(|| Counter(AtomicUsize::new(3)));
    assert_eq!(other.0.load(Ordering::SeqCst), 3);
    assert!(a.scope().try_singleton::<String>().is_none());
}

#[tokio::test]
async fn test_close_dispatches_unload_once() {
    let browser = Browser::new();
    let window = browser.open_window("https://example.com/").unwrap();
    let unloads = Arc::new(AtomicUsize::new(0));
    let counter = unloads.clone();
    window.scope().on(EventType::Unload, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    window.close();
    window.close();
    assert_eq!(unloads.load(Ordering::SeqCst), 1);
    assert!(window.is_closed());
    assert!(browser.windows().is_empty());
    assert!(window.fetch("/", RequestInit::new()).await.is_err());
}

#[tokio::test]
async fn test_storage_shared_per_origin() {
    let browser = Browser::new();
    let a = browser.open_window("https://example.com/a").unwrap();
    let b = browser.open_window("https://example.com/b").unwrap();
    let c = browser.open_window("https://other.test/").unwrap();
    a.storage().set("k", json!([1, 2])).await.unwrap();
    assert_eq!(b.storage().get("k").await.unwrap(), Some(json!([1, 2])));
    assert_eq!(c.storage().get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_page_xhr_uses_native_fetch() {
    let network = Arc::new(StaticNetwork::new().with_route(
        "/feed.xml",
        Response::new(200, b"<feed><entry/></feed>".to_vec()).with_header("content-type", "text/xml"),
    ));
    let browser = Browser::builder().network(network.clone()).build();
    let window = browser.open_window("https://example.com/").unwrap();

    let xhr = window.xml_http_request();
    xhr.open("GET", "/feed.xml").unwrap();
    xhr.set_response_type(XhrResponseType::Document).unwrap();
    xhr.send(None).await.unwrap();
    assert_eq!(xhr.ready_state(), ReadyState::Done);
    match xhr.response() {
        Some(XhrResponse::Document(doc)) => assert_eq!(doc.document_element(), "feed"),
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(xhr.response_xml().unwrap().element_count(), 2);
    assert_eq!(network.hits("/feed.xml"), 1);
}
