//! Tests for the WebSocket connection manager, the event bridge and the
//! store relay. No HTTP upgrades are performed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::Message;
use brandgen_core::request::{GenerationRequest, NewGenerationRequest, Requester};
use brandgen_db::store::{InMemoryRequestStore, RequestStore};
use brandgen_events::{NotificationEvent, Notifier, PageChannel, Topic};
use tokio_util::sync::CancellationToken;

use brandgen_api::ws::{spawn_store_relay, EventBridge, WsManager};

async fn next_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("message within a second")
        .expect("channel open");
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx = manager.add("conn-1".to_string(), None).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut rx1 = manager.add("conn-1".to_string(), None).await;
    let mut rx2 = manager.add("conn-2".to_string(), None).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
}

#[tokio::test]
async fn send_to_user_targets_only_that_user() {
    let manager = WsManager::new();
    let ana = uuid::Uuid::new_v4();
    let mut ana_rx = manager.add("a".to_string(), Some(ana)).await;
    let mut anon_rx = manager.add("b".to_string(), None).await;

    let sent = manager.send_to_user(ana, Message::Text("hi".into())).await;
    assert_eq!(sent, 1);
    assert!(matches!(ana_rx.recv().await, Some(Message::Text(_))));
    assert!(anon_rx.try_recv().is_err());
}

#[tokio::test]
async fn bridge_forwards_every_event_as_json() {
    let manager = Arc::new(WsManager::new());
    let page = PageChannel::new("server");
    let mut rx = manager.add("conn-1".to_string(), None).await;
    let bridge = EventBridge::spawn(&page, Arc::clone(&manager));

    let id = uuid::Uuid::now_v7();
    page.publish(NotificationEvent::request_created(id));
    page.publish(NotificationEvent::generation_progress(id, 40));

    let first = next_text(&mut rx).await;
    assert_eq!(first["topic"], "request-created");
    assert_eq!(first["request_id"], id.to_string());
    assert_eq!(first["origin"], "server");

    let second = next_text(&mut rx).await;
    assert_eq!(second["topic"], "generation-progress");
    assert_eq!(second["progress"], 40);

    bridge.shutdown().await;
    assert_eq!(page.subscriber_count(Topic::RequestCreated), 0);
}

#[tokio::test]
async fn store_relay_republishes_changes() {
    let store: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::new());
    let page = Arc::new(PageChannel::new("relay"));
    let seen = Arc::new(Mutex::new(Vec::<NotificationEvent>::new()));
    let subs: Vec<_> = [Topic::RequestCreated, Topic::RequestUpdated, Topic::RequestsCleared]
        .into_iter()
        .map(|topic| {
            let sink = Arc::clone(&seen);
            page.subscribe(
                topic,
                Arc::new(move |e: &NotificationEvent| sink.lock().unwrap().push(e.clone())),
            )
        })
        .collect();

    let cancel = CancellationToken::new();
    let relay = spawn_store_relay(Arc::clone(&store), page.clone(), cancel.clone());

    let requester = Requester {
        user_id: uuid::Uuid::new_v4(),
        name: "Ana".into(),
        email: None,
    };
    let req = GenerationRequest::create(
        &requester,
        NewGenerationRequest::image("relayed"),
        chrono::Utc::now(),
    )
    .unwrap();
    store.insert(&req).await.unwrap();
    store.delete_all().await.unwrap();

    for _ in 0..50 {
        if seen.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    relay.await.unwrap();

    let topics: Vec<Topic> = seen.lock().unwrap().iter().map(|e| e.topic()).collect();
    assert_eq!(topics, vec![Topic::RequestCreated, Topic::RequestsCleared]);
    drop(subs);
}
