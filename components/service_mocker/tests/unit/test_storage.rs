use serde_json::json;

use super::{browser, define_server};
use service_mocker::{create_client, ClientOptions, ServerError};
use web_platform::{KeyValueStore, RegistrationOptions, ServiceWorkerState};

async fn round_trip(options: ClientOptions) {
    let (browser, _) = browser();
    let servers = define_server(&browser);
    let window = browser.open_window("https://app.test/").unwrap();
    let client = create_client(&window, "/sw.js", options);
    client.ready().await;
    assert!(client.state().is_ready());
    let storage = servers.lock()[0].storage().clone();

    let stored = storage.set("user", json!({"name": "dolphin", "tags": [1, 2]})).await.unwrap();
    assert_eq!(stored, json!({"name": "dolphin", "tags": [1, 2]}));
    assert_eq!(
        storage.get("user").await.unwrap(),
        Some(json!({"name": "dolphin", "tags": [1, 2]}))
    );
    // the page's own store holds the value
    assert_eq!(
        window.storage().get("user").await.unwrap(),
        Some(json!({"name": "dolphin", "tags": [1, 2]}))
    );

    storage.remove("user").await.unwrap();
    assert_eq!(storage.get("user").await.unwrap(), None);

    storage.set("a", 1).await.unwrap();
    storage.set("b", "two").await.unwrap();
    storage.clear().await.unwrap();
    assert_eq!(storage.get("a").await.unwrap(), None);
    assert_eq!(storage.get("b").await.unwrap(), None);
}

#[tokio::test]
async fn test_storage_round_trip_through_worker() {
    round_trip(ClientOptions::default()).await;
}

#[tokio::test]
async fn test_storage_round_trip_in_legacy_mode() {
    round_trip(ClientOptions::legacy()).await;
}

#[tokio::test]
async fn test_storage_without_connected_page() {
    let (browser, _) = browser();
    let servers = define_server(&browser);
    let window = browser.open_window("https://app.test/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();

    let storage = servers.lock()[0].storage().clone();
    let err = storage.get("user").await.unwrap_err();
    assert!(matches!(err, ServerError::NoActiveClient));
    assert_eq!(err.to_string(), "No active client is found");
}
