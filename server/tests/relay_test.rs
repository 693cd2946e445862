//! Integration tests for publishing over HTTP and fan-out to WebSocket subscribers.

use futures_util::{SinkExt, StreamExt};
use relay_server::chat::{ChatMessage, UserInfo};
use relay_server::state::AppState;
use relay_server::ws::{Broadcaster, ConnectionRegistry};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start the server on a random port and return (base_url, state).
async fn start_test_server() -> (String, AppState) {
    let broadcaster = Broadcaster::new(ConnectionRegistry::new(), Duration::from_secs(2));
    let state = AppState::new(broadcaster);

    let app = relay_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

async fn connect(base_url: &str) -> WsStream {
    let ws_url = format!("{}/ws", base_url.replacen("http://", "ws://", 1));
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Registration happens after the upgrade completes; wait for it.
async fn wait_for_subscribers(registry: &ConnectionRegistry, expected: usize) {
    for _ in 0..100 {
        if registry.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "Expected {} subscribers, registry has {}",
        expected,
        registry.len()
    );
}

fn sample_message(text: &str) -> ChatMessage {
    ChatMessage {
        message: text.to_string(),
        time: "2024-05-01 12:00:00".to_string(),
        user_info: UserInfo {
            user_id: "1001".to_string(),
            user_name: "Ada Lovelace".to_string(),
            avatar: "https://cdn.example.invalid/avatars/1001.png".to_string(),
        },
    }
}

/// Read frames until a text frame arrives (skipping control frames).
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Expected a message within timeout")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_ping() {
    let (base_url, _state) = start_test_server().await;

    let resp = reqwest::get(format!("{}/ping", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"message": "pong"}));
}

#[tokio::test]
async fn test_send_with_no_subscribers_succeeds() {
    let (base_url, state) = start_test_server().await;
    assert!(state.registry.is_empty());

    let resp = reqwest::Client::new()
        .post(format!("{}/send", base_url))
        .json(&sample_message("anyone there?"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "success"}));
}

#[tokio::test]
async fn test_send_malformed_body_returns_400() {
    let (base_url, _state) = start_test_server().await;
    let client = reqwest::Client::new();

    let bodies = vec![
        // Missing userInfo
        json!({"message": "hi", "time": "t"}).to_string(),
        // Missing userInfo.userName
        json!({"message": "hi", "time": "t", "userInfo": {"userId": "1", "avatar": ""}}).to_string(),
        // Blank message
        json!({"message": "  ", "time": "t", "userInfo": {"userId": "1", "userName": "A", "avatar": ""}})
            .to_string(),
        // Not JSON at all
        "{not json".to_string(),
    ];

    for body in bodies {
        let resp = client
            .post(format!("{}/send", base_url))
            .header("content-type", "application/json")
            .body(body.clone())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400, "Body should be rejected: {}", body);
        let error: serde_json::Value = resp.json().await.unwrap();
        let message = error["error"].as_str().expect("error field should be a string");
        assert!(!message.is_empty(), "Error message should not be empty for {}", body);
    }
}

#[tokio::test]
async fn test_send_reaches_every_subscriber_unchanged() {
    let (base_url, state) = start_test_server().await;

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        subscribers.push(connect(&base_url).await);
    }
    wait_for_subscribers(&state.registry, 3).await;

    let sent = sample_message("héllo, wörld \u{1F680} \"quoted\"");
    let resp = reqwest::Client::new()
        .post(format!("{}/send", base_url))
        .json(&sent)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    for ws in &mut subscribers {
        let decoded: ChatMessage = serde_json::from_str(&next_text(ws).await).unwrap();
        assert_eq!(decoded, sent);
    }
}

#[tokio::test]
async fn test_messages_arrive_in_publish_order() {
    let (base_url, state) = start_test_server().await;
    let mut ws = connect(&base_url).await;
    wait_for_subscribers(&state.registry, 1).await;

    let client = reqwest::Client::new();
    for i in 0..5 {
        let resp = client
            .post(format!("{}/send", base_url))
            .json(&sample_message(&format!("message {}", i)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    for i in 0..5 {
        let decoded: ChatMessage = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(decoded.message, format!("message {}", i));
    }
}

#[tokio::test]
async fn test_disconnect_removes_subscriber() {
    let (base_url, state) = start_test_server().await;

    let mut leaving = connect(&base_url).await;
    let mut staying = connect(&base_url).await;
    wait_for_subscribers(&state.registry, 2).await;

    leaving.send(Message::Close(None)).await.expect("Failed to send close");
    drop(leaving);
    wait_for_subscribers(&state.registry, 1).await;

    // The remaining subscriber still receives broadcasts
    let resp = reqwest::Client::new()
        .post(format!("{}/send", base_url))
        .json(&sample_message("still here"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let decoded: ChatMessage = serde_json::from_str(&next_text(&mut staying).await).unwrap();
    assert_eq!(decoded.message, "still here");
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (base_url, state) = start_test_server().await;
    let ws = connect(&base_url).await;
    wait_for_subscribers(&state.registry, 1).await;

    let (mut write, mut read) = ws.split();
    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_closes_subscribers() {
    let (base_url, state) = start_test_server().await;
    let mut ws = connect(&base_url).await;
    wait_for_subscribers(&state.registry, 1).await;

    state.shutdown.cancel();
    wait_for_subscribers(&state.registry, 0).await;

    // The server side is gone: the stream ends or errors
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "Client should observe the connection closing");
}

#[tokio::test]
async fn test_history_not_routed_without_store() {
    let (base_url, _state) = start_test_server().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/history", base_url))
        .json(&json!({"time": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
