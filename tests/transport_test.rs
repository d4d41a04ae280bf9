// tests/transport_test.rs — Integration test: reconnecting transport against a local WebSocket server

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message as WsMessage, Utf8Bytes};
use tokio_tungstenite::{accept_async, WebSocketStream};

use chatkeep::infra::config::TransportConfig;
use chatkeep::transport::client::TransportClient;
use chatkeep::transport::{ConnectionState, InboundMessage, TransportEvent};

const WAIT: Duration = Duration::from_secs(10);

type ServerSocket = WebSocketStream<TcpStream>;

fn config(port: u16) -> TransportConfig {
    TransportConfig {
        url: format!("ws://127.0.0.1:{port}/ws"),
        max_reconnect_attempts: 5,
        initial_reconnect_delay_ms: 10,
        max_reconnect_delay_ms: 40,
        keepalive_interval_secs: 3600,
    }
}

fn client(port: u16) -> (TransportClient, mpsc::UnboundedReceiver<TransportEvent>) {
    client_with(config(port))
}

fn client_with(config: TransportConfig) -> (TransportClient, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = TransportClient::new(config, "user-1", move |event| {
        let _ = tx.send(event);
    })
    .unwrap();
    (client, rx)
}

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    accept_async(stream).await.unwrap()
}

/// Next text frame as JSON, skipping keepalive pings.
async fn read_json(ws: &mut ServerSocket) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame from client")
            .expect("stream ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] != "ping" {
                return value;
            }
        }
    }
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into())).await.unwrap();
}

/// Collect events until `done` matches one (inclusive).
async fn events_until(
    rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    done: impl Fn(&TransportEvent) -> bool,
) -> Vec<TransportEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed");
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

fn is_status(event: &TransportEvent, state: ConnectionState) -> bool {
    matches!(event, TransportEvent::StatusChanged(s) if *s == state)
}

#[tokio::test]
async fn test_queued_messages_flush_in_order_before_new_traffic() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);

    client.send_chat_message("one", Some("s-1"));
    client.start_typing();
    client.send_chat_message("two", Some("s-1"));
    assert_eq!(client.status().queued_message_count, 3);

    client.connect();
    let mut ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;
    client.send_chat_message("three", None);

    let first = read_json(&mut ws).await;
    assert_eq!(first["type"], "chat_message");
    assert_eq!(first["message"], "one");
    assert_eq!(first["session_id"], "s-1");
    assert!(first.get("timestamp").is_some());
    assert_eq!(read_json(&mut ws).await["type"], "typing_start");
    assert_eq!(read_json(&mut ws).await["message"], "two");
    assert_eq!(read_json(&mut ws).await["message"], "three");

    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.queued_message_count, 0);
}

#[tokio::test]
async fn test_inbound_frames_are_dispatched() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);
    client.connect();
    let mut ws = accept(&listener).await;

    send_json(&mut ws, serde_json::json!({"type": "bot_typing", "is_typing": true})).await;
    send_json(&mut ws, serde_json::json!({"type": "mystery", "payload": 1})).await;
    send_json(&mut ws, serde_json::json!({"type": "chat_response", "response": "hi there"})).await;

    let seen = events_until(&mut events, |e| {
        matches!(e, TransportEvent::MessageReceived(InboundMessage::ChatResponse { .. }))
    })
    .await;

    assert!(seen.contains(&TransportEvent::TypingChanged(true)));
    let received: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            TransportEvent::MessageReceived(m) => Some(m.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(received.len(), 2);
    assert_eq!(
        received[1],
        InboundMessage::ChatResponse {
            message: "hi there".into(),
            user_message: None,
        }
    );
}

#[tokio::test]
async fn test_normal_server_close_does_not_reconnect() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);
    client.connect();
    let mut ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;

    ws.send(WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static("bye"),
    })))
    .await
    .unwrap();

    let seen = events_until(&mut events, |e| is_status(e, ConnectionState::Disconnected)).await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, TransportEvent::Reconnecting { .. })));
    assert_eq!(client.status().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_client_disconnect_sends_close() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);
    client.connect();
    let mut ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;

    client.disconnect();

    let frame = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(WsMessage::Close(_))) | None));
    events_until(&mut events, |e| is_status(e, ConnectionState::Disconnected)).await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_dropped_connection_reconnects_and_delivers_backlog() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);
    client.connect();

    let ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;
    drop(ws);

    events_until(&mut events, |e| matches!(e, TransportEvent::Reconnecting { .. })).await;
    client.send_chat_message("while away", None);

    let mut ws = accept(&listener).await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["message"], "while away");
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;
    assert_eq!(client.status().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_reconnect_budget_then_terminal_error() {
    // Grab a free port, then close it so every attempt is refused
    let (listener, port) = listen().await;
    drop(listener);

    let (client, mut events) = client(port);
    client.connect();

    let seen = events_until(&mut events, |e| {
        matches!(e, TransportEvent::Error { terminal: true, .. })
    })
    .await;

    let attempts: Vec<(u32, u128)> = seen
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Reconnecting { attempt, delay } => Some((*attempt, delay.as_millis())),
            _ => None,
        })
        .collect();
    assert_eq!(
        attempts,
        vec![(1, 10), (2, 20), (3, 40), (4, 40), (5, 40)]
    );

    let terminal: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, TransportEvent::Error { terminal: true, .. }))
        .collect();
    assert_eq!(terminal.len(), 1);

    events_until(&mut events, |e| is_status(e, ConnectionState::Disconnected)).await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_keepalive_pings_while_connected() {
    let (listener, port) = listen().await;
    let (client, mut events) = client_with(TransportConfig {
        keepalive_interval_secs: 1,
        ..config(port)
    });
    client.connect();
    let mut ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;

    let ping = loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no keepalive within the interval")
            .expect("stream ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            break serde_json::from_str::<Value>(text.as_str()).unwrap();
        }
    };
    assert_eq!(ping["type"], "ping");
    assert!(ping["timestamp"].is_string(), "{ping}");
}

#[tokio::test]
async fn test_no_keepalive_after_disconnect() {
    let (listener, port) = listen().await;
    let (client, mut events) = client_with(TransportConfig {
        keepalive_interval_secs: 1,
        ..config(port)
    });
    client.connect();
    let mut ws = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;

    client.disconnect();
    events_until(&mut events, |e| is_status(e, ConnectionState::Disconnected)).await;

    // Watch the socket for more than two keepalive intervals
    loop {
        match tokio::time::timeout(Duration::from_millis(2500), ws.next()).await {
            Err(_) | Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                panic!("unexpected frame after disconnect: {text}")
            }
            Ok(Some(Ok(_))) => {}
        }
    }
    assert_eq!(client.status().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_right_after_disconnect_opens_new_connection() {
    let (listener, port) = listen().await;
    let (client, mut events) = client(port);
    client.connect();
    let mut first = accept(&listener).await;
    events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;

    client.disconnect();
    client.connect();
    client.send_chat_message("after reconnect", None);

    let frame = tokio::time::timeout(WAIT, first.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(WsMessage::Close(_))) | None));

    let mut second = accept(&listener).await;
    let seen = events_until(&mut events, |e| is_status(e, ConnectionState::Connected)).await;
    assert!(seen.iter().any(|e| is_status(e, ConnectionState::Connecting)));
    assert_eq!(read_json(&mut second).await["message"], "after reconnect");
    assert!(client.is_connected());
}
