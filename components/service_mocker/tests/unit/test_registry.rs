use messaging::{Action, ClientId, ExecutionContext, Message, MessageChannel, MessageEvent, MessageTarget};
use router::RouterList;
use service_mocker::{create_server, ClientRegistry, ServerError};

use super::browser;

fn event(action: Action, source: Option<&str>) -> (MessageEvent, messaging::MessagePort) {
    let MessageChannel { port1, port2 } = MessageChannel::new();
    let mut event = MessageEvent::new(Message::new(action));
    event.ports = vec![port2];
    event.source = source.map(ClientId::new);
    (event, port1)
}

#[tokio::test]
async fn test_page_registry_keeps_sentinel_connected() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();
    let registry = ClientRegistry::new(window.scope());

    assert_eq!(registry.context(), ExecutionContext::Page);
    assert!(registry.has(&ClientId::legacy()));
    assert!(!registry.delete(&ClientId::legacy()));
    assert_eq!(registry.len(), 1);

    assert!(registry.add(ClientId::new("a")));
    assert!(!registry.add(ClientId::new("a")));
    assert_eq!(registry.ids(), vec![ClientId::legacy(), ClientId::new("a")]);
    assert!(registry.delete(&ClientId::new("a")));
    assert!(!registry.delete(&ClientId::new("a")));
}

#[tokio::test]
async fn test_ping_records_sender_and_replies_pong() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();
    let registry = ClientRegistry::new(window.scope());

    let (ping, mut reply) = event(Action::Ping, Some("tab-1"));
    assert!(registry.on_message(&ping));
    assert_eq!(reply.recv().await.unwrap().action, Action::Pong);
    assert!(registry.has(&ClientId::new("tab-1")));

    let (disconnect, _reply) = event(Action::Disconnect, Some("tab-1"));
    assert!(registry.on_message(&disconnect));
    assert!(!registry.has(&ClientId::new("tab-1")));
}

#[tokio::test]
async fn test_claim_outside_a_worker_fails() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();
    let registry = ClientRegistry::new(window.scope());

    let (claim, mut reply) = event(Action::RequestClaim, None);
    assert!(registry.on_message(&claim));
    let reply = reply.recv().await.unwrap();
    assert_eq!(reply.action, Action::Failed);
    assert!(reply.error_message().unwrap().contains("worker"));
}

#[tokio::test]
async fn test_other_actions_are_left_alone() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();
    let registry = ClientRegistry::new(window.scope());

    let (get, _reply) = event(Action::GetStorage, Some("tab-1"));
    assert!(!registry.on_message(&get));
    assert!(!registry.has(&ClientId::new("tab-1")));
}

#[tokio::test]
async fn test_available_client_in_page() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();
    let registry = ClientRegistry::new(window.scope());

    let target = registry.get_available().unwrap();
    assert!(target.is_same_context());

    window.close();
    assert!(matches!(
        registry.get_available(),
        Err(ServerError::NoActiveClient)
    ));
}

#[tokio::test]
async fn test_servers_share_one_registry_and_router_list() {
    let (browser, _) = browser();
    let window = browser.open_window("https://app.test/").unwrap();

    let api = create_server(window.scope(), "/api").unwrap();
    let admin = create_server(window.scope(), "/admin").unwrap();
    assert!(api.is_legacy());
    assert_eq!(api.router().base_url(), "https://app.test/api");
    assert_eq!(admin.router().base_url(), "https://app.test/admin");
    assert_eq!(RouterList::for_scope(window.scope()).len(), 2);
    assert_eq!(ClientRegistry::for_scope(window.scope()).len(), 1);
}
