use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use ptms_net::{
    spawn_chat_client, ChatClientConfig, ChatCommand, ChatNotification, ReconnectPolicy,
};
use ptms_shared::protocol::ChatEvent;
use ptms_shared::types::{ConnectionState, RoomId, UserId};

#[derive(Default)]
struct Gateway {
    hits: AtomicUsize,
    /// Close the first link right after confirming its first subscription.
    drop_first: bool,
    /// Never answer heartbeats.
    silent: bool,
}

async fn upgrade(State(gw): State<Arc<Gateway>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve(gw, socket))
}

async fn serve(gw: Arc<Gateway>, mut socket: WebSocket) {
    let hit = gw.hits.fetch_add(1, Ordering::SeqCst) + 1;
    let mut next_message_id = 100;

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(&text).expect("client frame is json");

        let replies = match frame["type"].as_str() {
            Some("authenticate") => {
                if frame["token"] == "good-token" {
                    vec![json!({"type": "authenticated", "user_id": 7})]
                } else {
                    vec![json!({"type": "error", "message": "bad token"})]
                }
            }
            Some("subscribe") => vec![json!({"type": "subscribed", "room_id": frame["room_id"]})],
            Some("send_message") => {
                next_message_id += 1;
                vec![
                    json!({"type": "message_sent", "room_id": frame["room_id"], "message_id": next_message_id}),
                    json!({
                        "type": "new_message",
                        "room_id": frame["room_id"],
                        "sender_id": 7,
                        "body": frame["body"],
                        "timestamp": "2024-03-01T10:00:00Z"
                    }),
                ]
            }
            Some("ping") if gw.silent => Vec::new(),
            Some("ping") => vec![json!({"type": "pong"})],
            _ => Vec::new(),
        };

        for reply in replies {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }

        if gw.drop_first && hit == 1 && frame["type"] == "subscribe" {
            return;
        }
    }
}

async fn start_gateway(gw: Arc<Gateway>) -> SocketAddr {
    let app = Router::new().route("/ws/chat", get(upgrade)).with_state(gw);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve gateway") });
    addr
}

fn config(addr: SocketAddr, token: &str) -> ChatClientConfig {
    let mut config = ChatClientConfig::new(format!("ws://{addr}/ws/chat"), token);
    config.connect_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };
    config
}

/// Wait for the first notification matching `pred`, collecting the skipped ones.
async fn next_matching(
    rx: &mut mpsc::Receiver<ChatNotification>,
    pred: impl Fn(&ChatNotification) -> bool,
) -> (ChatNotification, Vec<ChatNotification>) {
    let mut skipped = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let n = rx.recv().await.expect("chat task ended early");
            if pred(&n) {
                return (n, skipped);
            }
            skipped.push(n);
        }
    })
    .await
    .expect("timed out waiting for chat notification")
}

fn is_subscribed(room: i64) -> impl Fn(&ChatNotification) -> bool {
    move |n| {
        matches!(n, ChatNotification::Event(ChatEvent::Subscribed { room_id }) if *room_id == RoomId(room))
    }
}

#[tokio::test]
async fn authenticates_subscribes_and_exchanges_messages() {
    let gw = Arc::new(Gateway::default());
    let addr = start_gateway(gw.clone()).await;

    let (handle, mut rx) = spawn_chat_client(config(addr, "good-token"));
    handle.send(ChatCommand::Subscribe(RoomId(3))).await.unwrap();

    let (auth, before) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::Authenticated { .. }))
    })
    .await;
    assert_eq!(
        auth,
        ChatNotification::Event(ChatEvent::Authenticated { user_id: UserId(7) })
    );
    assert!(before.contains(&ChatNotification::StateChanged(ConnectionState::Connecting)));
    assert!(before.contains(&ChatNotification::StateChanged(ConnectionState::Connected)));

    next_matching(&mut rx, is_subscribed(3)).await;

    handle
        .send(ChatCommand::SendMessage {
            room_id: RoomId(3),
            body: "hello".into(),
        })
        .await
        .unwrap();

    let (sent, _) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::MessageSent { .. }))
    })
    .await;
    assert_eq!(
        sent,
        ChatNotification::Event(ChatEvent::MessageSent {
            room_id: RoomId(3),
            message_id: 101
        })
    );

    let (echo, _) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::NewMessage { .. }))
    })
    .await;
    match echo {
        ChatNotification::Event(ChatEvent::NewMessage {
            room_id,
            sender_id,
            body,
            ..
        }) => {
            assert_eq!(room_id, RoomId(3));
            assert_eq!(sender_id, UserId(7));
            assert_eq!(body, "hello");
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    handle.disconnect().await;
}

#[tokio::test]
async fn rejected_token_is_reported_as_error_event() {
    let gw = Arc::new(Gateway::default());
    let addr = start_gateway(gw.clone()).await;

    let (handle, mut rx) = spawn_chat_client(config(addr, "expired"));

    let (err, skipped) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::Error { .. }))
    })
    .await;
    assert_eq!(
        err,
        ChatNotification::Event(ChatEvent::Error {
            message: "bad token".into()
        })
    );
    assert!(!skipped
        .iter()
        .any(|n| *n == ChatNotification::StateChanged(ConnectionState::Authenticated)));

    // sends are refused until the link is authenticated
    handle
        .send(ChatCommand::SendMessage {
            room_id: RoomId(1),
            body: "hi".into(),
        })
        .await
        .unwrap();
    let (failed, _) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::SendFailed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        ChatNotification::SendFailed { room_id: RoomId(1), .. }
    ));

    handle.disconnect().await;
}

#[tokio::test]
async fn reconnects_and_replays_subscriptions() {
    let gw = Arc::new(Gateway {
        drop_first: true,
        ..Default::default()
    });
    let addr = start_gateway(gw.clone()).await;

    let (handle, mut rx) = spawn_chat_client(config(addr, "good-token"));
    handle.send(ChatCommand::Subscribe(RoomId(3))).await.unwrap();

    next_matching(&mut rx, is_subscribed(3)).await;

    let (dropped, _) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::Disconnected { .. }))
    })
    .await;
    assert!(matches!(
        dropped,
        ChatNotification::Event(ChatEvent::Disconnected { .. })
    ));

    let (_, between) = next_matching(&mut rx, is_subscribed(3)).await;
    assert!(between.contains(&ChatNotification::StateChanged(ConnectionState::Authenticated)));
    assert_eq!(gw.hits.load(Ordering::SeqCst), 2);

    handle.disconnect().await;
}

#[tokio::test]
async fn silent_gateway_trips_heartbeat_watchdog_and_reconnects() {
    let gw = Arc::new(Gateway {
        silent: true,
        ..Default::default()
    });
    let addr = start_gateway(gw.clone()).await;

    let mut cfg = config(addr, "good-token");
    cfg.heartbeat = Duration::from_millis(30);
    let (handle, mut rx) = spawn_chat_client(cfg);

    next_matching(&mut rx, |n| {
        *n == ChatNotification::StateChanged(ConnectionState::Authenticated)
    })
    .await;

    let (dropped, _) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::Event(ChatEvent::Disconnected { .. }))
    })
    .await;
    assert_eq!(
        dropped,
        ChatNotification::Event(ChatEvent::Disconnected {
            code: 4000,
            reason: "heartbeat timeout".into()
        })
    );

    next_matching(&mut rx, |n| {
        *n == ChatNotification::StateChanged(ConnectionState::Authenticated)
    })
    .await;
    assert!(gw.hits.load(Ordering::SeqCst) >= 2);

    handle.disconnect().await;
}

#[tokio::test]
async fn gives_up_after_reconnect_budget() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut cfg = config(addr, "good-token");
    cfg.reconnect.max_attempts = 2;
    let (_handle, mut rx) = spawn_chat_client(cfg);

    let (failed, skipped) = next_matching(&mut rx, |n| {
        matches!(n, ChatNotification::ReconnectFailed { .. })
    })
    .await;
    assert_eq!(failed, ChatNotification::ReconnectFailed { attempts: 2 });

    let errors = skipped
        .iter()
        .filter(|n| matches!(n, ChatNotification::Event(ChatEvent::Error { .. })))
        .count();
    assert_eq!(errors, 3);

    // task is finished
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn explicit_disconnect_does_not_reconnect() {
    let gw = Arc::new(Gateway::default());
    let addr = start_gateway(gw.clone()).await;

    let (handle, mut rx) = spawn_chat_client(config(addr, "good-token"));
    next_matching(&mut rx, |n| {
        *n == ChatNotification::StateChanged(ConnectionState::Authenticated)
    })
    .await;

    handle.disconnect().await;

    let mut rest = Vec::new();
    while let Some(n) = rx.recv().await {
        rest.push(n);
    }
    assert!(rest.contains(&ChatNotification::Event(ChatEvent::Disconnected {
        code: 1000,
        reason: "closed by client".into()
    })));
    assert_eq!(
        rest.last(),
        Some(&ChatNotification::Event(ChatEvent::Disconnected {
            code: 1000,
            reason: "closed by client".into()
        }))
    );
    assert_eq!(gw.hits.load(Ordering::SeqCst), 1);
}
