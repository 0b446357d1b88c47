//! End-to-end tests of the live channel over a real socket.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crm_api::middleware::auth::encode_refresh;
use crm_api::routes::create_router;
use crm_api::state::AppState;
use crm_common::types::{NewNotification, UserRole};
use crm_engine::store::NotificationStore;

use common::{TEST_SECRET, memory_state, test_user, token_for};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (client, _response) = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    client
}

/// Registration happens after the upgrade completes on the server side.
async fn wait_for_channels(state: &AppState, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while state.registry.channel_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_event(client: &mut Client) -> serde_json::Value {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap() // timeout
            .unwrap() // stream ended
            .unwrap(); // protocol error
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn notification_is_pushed_to_every_device() {
    let (state, _store) = memory_state();
    let user = test_user(UserRole::Agent);
    let token = token_for(&user);
    let addr = spawn_server(state.clone()).await;

    let mut phone = connect(addr, &token).await;
    let mut laptop = connect(addr, &token).await;
    wait_for_channels(&state, 2).await;

    let created = state
        .dispatcher
        .notify(NewNotification::new(
            user.id,
            "Nuevo Lead Asignado",
            "Se te ha asignado un nuevo lead: María González",
        ))
        .await
        .unwrap();

    for client in [&mut phone, &mut laptop] {
        let event = next_event(client).await;
        assert_eq!(event["event"], "notification");
        assert_eq!(event["data"]["id"], json!(created.id));
        assert_eq!(event["data"]["title"], "Nuevo Lead Asignado");
        assert_eq!(event["data"]["read"], false);
    }
}

#[tokio::test]
async fn mark_as_read_on_one_device_reaches_the_other() {
    let (state, store) = memory_state();
    let user = test_user(UserRole::Agent);
    let token = token_for(&user);
    let n = store
        .create(NewNotification::new(user.id, "t", "m"))
        .await
        .unwrap();
    let addr = spawn_server(state.clone()).await;

    let mut phone = connect(addr, &token).await;
    let mut laptop = connect(addr, &token).await;
    wait_for_channels(&state, 2).await;

    phone
        .send(Message::text(
            json!({"event": "mark_as_read", "data": {"id": n.id}}).to_string(),
        ))
        .await
        .unwrap();

    for client in [&mut laptop, &mut phone] {
        let event = next_event(client).await;
        assert_eq!(event, json!({"event": "notification_read", "data": {"id": n.id}}));
    }
    assert_eq!(store.unread_count(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn other_users_do_not_see_events() {
    let (state, _store) = memory_state();
    let alice = test_user(UserRole::Agent);
    let bob = test_user(UserRole::Agent);
    let addr = spawn_server(state.clone()).await;

    let mut alice_client = connect(addr, &token_for(&alice)).await;
    let mut bob_client = connect(addr, &token_for(&bob)).await;
    wait_for_channels(&state, 2).await;

    state
        .dispatcher
        .notify(NewNotification::new(bob.id, "for bob", "m"))
        .await
        .unwrap();

    assert_eq!(next_event(&mut bob_client).await["data"]["title"], "for bob");
    assert!(
        timeout(Duration::from_millis(200), alice_client.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (state, _store) = memory_state();
    let user = test_user(UserRole::Agent);
    let addr = spawn_server(state.clone()).await;

    let mut client = connect(addr, &token_for(&user)).await;
    wait_for_channels(&state, 1).await;

    client.send(Message::text("hello")).await.unwrap();
    let event = next_event(&mut client).await;
    assert_eq!(event["event"], "error");

    state
        .dispatcher
        .notify(NewNotification::new(user.id, "still here", "m"))
        .await
        .unwrap();
    let event = next_event(&mut client).await;
    assert_eq!(event["event"], "notification");
}

#[tokio::test]
async fn disconnect_unregisters_channel() {
    let (state, _store) = memory_state();
    let user = test_user(UserRole::Agent);
    let addr = spawn_server(state.clone()).await;

    let mut client = connect(addr, &token_for(&user)).await;
    wait_for_channels(&state, 1).await;

    client.close(None).await.unwrap();
    wait_for_channels(&state, 0).await;
    assert!(!state.registry.is_online(user.id));
}

#[tokio::test]
async fn handshake_requires_valid_access_token() {
    let (state, _store) = memory_state();
    let user = test_user(UserRole::Agent);
    let addr = spawn_server(state.clone()).await;

    let missing = connect_async(format!("ws://{}/ws", addr)).await;
    let Err(tokio_tungstenite::tungstenite::Error::Http(response)) = missing else {
        panic!("handshake without token must fail");
    };
    assert_eq!(response.status(), 401);

    let garbage = connect_async(format!("ws://{}/ws?token=garbage", addr)).await;
    let Err(tokio_tungstenite::tungstenite::Error::Http(response)) = garbage else {
        panic!("handshake with invalid token must fail");
    };
    assert_eq!(response.status(), 403);

    let refresh = encode_refresh(&user, TEST_SECRET, 1).unwrap();
    let wrong_kind = connect_async(format!("ws://{}/ws?token={}", addr, refresh)).await;
    assert!(wrong_kind.is_err());

    assert_eq!(state.registry.channel_count(), 0);
}
