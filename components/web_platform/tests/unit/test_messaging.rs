use parking_lot::Mutex;
use std::sync::Arc;

use messaging::{
    send_request, Action, ClientId, Delivery, EventType, Message, MessageTarget, Timeout,
};
use web_platform::{Browser, ContainerEvent, RegistrationOptions, ScopeEvent, ServiceWorkerState, Window};

/// Worker replying `pong` to `ping` and recording each message's source
fn define_echo_worker(browser: &Browser, sources: Arc<Mutex<Vec<Option<ClientId>>>>) {
    browser.scripts().define("/sw.js", move |scope| {
        let sources = sources.clone();
        scope.on(EventType::Message, move |event| {
            if let ScopeEvent::Message(message) = event {
                sources.lock().push(message.source.clone());
                if message.data.action == Action::Ping {
                    message.reply(Message::new(Action::Pong)).unwrap();
                }
            }
        });
    });
}

async fn controlled_window(browser: &Browser) -> Window {
    let window = browser.open_window("https://example.com/").unwrap();
    let registration = window
        .container()
        .register("/sw.js", RegistrationOptions::default())
        .unwrap();
    let worker = registration.newest_worker().unwrap();
    worker.wait_for(ServiceWorkerState::Activated).await.unwrap();
    worker.scope().clients().unwrap().claim().unwrap();
    window
}

#[tokio::test]
async fn test_request_to_controller() {
    let browser = Browser::new();
    let sources = Arc::new(Mutex::new(Vec::new()));
    define_echo_worker(&browser, sources.clone());
    let window = controlled_window(&browser).await;

    let target = window.controller_target().unwrap();
    let reply = send_request(&target, Message::new(Action::Ping), Timeout::Default)
        .await
        .unwrap();
    assert_eq!(reply.action, Action::Pong);
    assert_eq!(*sources.lock(), vec![Some(window.id().clone())]);
}

#[tokio::test]
async fn test_older_engine_omits_source() {
    let browser = Browser::builder().reports_message_source(false).build();
    let sources = Arc::new(Mutex::new(Vec::new()));
    define_echo_worker(&browser, sources.clone());
    let window = controlled_window(&browser).await;

    let target = window.controller_target().unwrap();
    send_request(&target, Message::new(Action::Ping), Timeout::Default)
        .await
        .unwrap();
    assert_eq!(*sources.lock(), vec![None]);
}

#[tokio::test]
async fn test_worker_posts_to_client() {
    let browser = Browser::new();
    define_echo_worker(&browser, Arc::new(Mutex::new(Vec::new())));
    let window = controlled_window(&browser).await;

    window.container().on(EventType::Message, |event| {
        if let ContainerEvent::Message(message) = event {
            let value = message.data.get("value").cloned().unwrap_or_default();
            message.reply(Message::success(value)).unwrap();
        }
    });

    let worker = window.controller().unwrap();
    let client = worker.scope().clients().unwrap().get(window.id()).unwrap();
    let reply = send_request(
        &client,
        Message::new(Action::GetStorage).with("value", 7),
        Timeout::Default,
    )
    .await
    .unwrap();
    assert_eq!(reply.result(), Some(&serde_json::json!(7)));

    window.close();
    assert!(client.post_message(Message::new(Action::Ping), Vec::new(), Delivery::Directed).is_err());
}

#[tokio::test]
async fn test_self_target_requires_broadcast() {
    let browser = Browser::new();
    let window = browser.open_window("http://localhost:8080/").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    window.scope().on(EventType::Message, move |event| {
        if let ScopeEvent::Message(message) = event {
            log.lock().push((message.source.clone(), message.origin.clone()));
            message.reply(Message::new(Action::Pong)).unwrap();
        }
    });

    let target = window.self_target();
    assert!(target.is_same_context());
    assert!(target
        .post_message(Message::new(Action::Ping), Vec::new(), Delivery::Directed)
        .is_err());

    let reply = send_request(&target, Message::new(Action::Ping), Timeout::Default)
        .await
        .unwrap();
    assert_eq!(reply.action, Action::Pong);
    assert_eq!(
        *seen.lock(),
        vec![(Some(ClientId::legacy()), "http://localhost:8080".to_string())]
    );
}

#[tokio::test]
async fn test_self_target_drops_foreign_origin() {
    let browser = Browser::new();
    let window = browser.open_window("https://example.com/").unwrap();
    let target = window.self_target();
    // wildcard broadcast reaches the page, but nobody is listening
    let err = send_request(&target, Message::new(Action::Ping), Timeout::from_millis(20))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let delivery = Delivery::Broadcast {
        target_origin: "https://elsewhere.test".to_string(),
    };
    assert!(target
        .post_message(Message::new(Action::Ping), Vec::new(), delivery)
        .is_ok());
}
