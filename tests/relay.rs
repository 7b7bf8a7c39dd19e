mod common;

use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use ws_relay::message::{INVALID_JSON, WELCOME_MESSAGE};
use ws_relay::{AppError, Envelope, Server, ServerConfig};

use common::{assert_silent, join, read_json, start_server, wait_for_live_count, Socket};

/// Next frame whose type is not `skip`
async fn read_json_except(socket: &mut Socket, skip: &str) -> serde_json::Value {
    loop {
        let frame = read_json(socket).await;
        if frame["type"] != skip {
            return frame;
        }
    }
}

#[tokio::test]
async fn welcome_is_sent_on_connect() {
    let server = start_server().await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.unwrap();

    let welcome = read_json(&mut socket).await;
    assert_eq!(welcome["type"], "connected");
    assert_eq!(welcome["message"], WELCOME_MESSAGE);
    assert!(welcome["timestamp"].is_string());
}

#[tokio::test]
async fn message_is_broadcast_to_peers_and_echoed_to_sender() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;
    let mut carol = join(&server.url).await;

    alice
        .send(Message::Text(r#"{"type":"chat","data":"hi"}"#.into()))
        .await
        .unwrap();

    for peer in [&mut bob, &mut carol] {
        let broadcast = read_json(peer).await;
        assert_eq!(broadcast["type"], "broadcast");
        assert_eq!(broadcast["data"], "hi");
        assert!(broadcast["timestamp"].is_string());
        assert_silent(peer).await;
    }

    let echo = read_json(&mut alice).await;
    assert_eq!(echo["type"], "echo");
    assert_eq!(echo["data"], "hi");
    // No broadcast of its own message
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn non_envelope_json_is_relayed_whole() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;

    alice
        .send(Message::Text(r#"[1, 2, 3]"#.into()))
        .await
        .unwrap();

    let broadcast = read_json(&mut bob).await;
    assert_eq!(broadcast["data"], json!([1, 2, 3]));
    let echo = read_json(&mut alice).await;
    assert_eq!(echo["data"], json!([1, 2, 3]));
}

#[tokio::test]
async fn invalid_json_gets_error_only_to_sender() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;

    alice
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();

    let error = read_json(&mut alice).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], INVALID_JSON);
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;

    // Connection stays usable
    alice
        .send(Message::Text(r#"{"type":"chat","data":"still here"}"#.into()))
        .await
        .unwrap();
    assert_eq!(read_json(&mut bob).await["data"], "still here");
    assert_eq!(read_json(&mut alice).await["type"], "echo");
}

#[tokio::test]
async fn invalid_binary_frame_gets_error() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;

    alice
        .send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
        .await
        .unwrap();

    let error = read_json(&mut alice).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "Invalid JSON format");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn closed_connection_is_removed() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;
    wait_for_live_count(&server.router, 2).await;

    bob.close(None).await.unwrap();
    wait_for_live_count(&server.router, 1).await;

    alice
        .send(Message::Text(r#"{"type":"chat","data":1}"#.into()))
        .await
        .unwrap();
    assert_eq!(read_json(&mut alice).await["type"], "echo");
}

#[tokio::test]
async fn collaborator_broadcast_reaches_every_connection() {
    let server = start_server().await;
    let mut alice = join(&server.url).await;
    let mut bob = join(&server.url).await;
    wait_for_live_count(&server.router, 2).await;

    server
        .router
        .broadcast(Envelope::application(
            "gallery_item_added",
            json!({"id": 42}),
        ))
        .await
        .unwrap();

    for socket in [&mut alice, &mut bob] {
        let update = read_json(socket).await;
        assert_eq!(update["type"], "gallery_item_added");
        assert_eq!(update["data"]["id"], 42);
    }
}

#[tokio::test]
async fn handshake_on_other_path_is_rejected() {
    let server = start_server().await;
    let other = server.url.replace("/ws", "/other");

    assert!(connect_async(other.as_str()).await.is_err());
    assert_eq!(server.router.live_count().await.unwrap(), 0);
}

#[tokio::test]
async fn replies_follow_welcome_and_frame_order() {
    let server = start_server().await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.unwrap();

    // Sent before reading anything back
    socket
        .send(Message::Text(r#"{"type":"chat","data":"first"}"#.into()))
        .await
        .unwrap();
    socket.send(Message::Text("{not json".into())).await.unwrap();

    assert_eq!(read_json(&mut socket).await["type"], "connected");
    let echo = read_json(&mut socket).await;
    assert_eq!(echo["type"], "echo");
    assert_eq!(echo["data"], "first");
    let error = read_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], INVALID_JSON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn welcome_comes_first_while_router_is_busy() {
    let server = start_server().await;
    let mut idle = Vec::new();
    for _ in 0..20 {
        idle.push(join(&server.url).await);
    }

    let router = server.router.clone();
    let flood = tokio::spawn(async move {
        let mut n = 0u64;
        while router
            .broadcast(Envelope::application("tick", json!(n)))
            .await
            .is_ok()
        {
            n += 1;
        }
    });

    for _ in 0..50 {
        let (mut socket, _) = connect_async(server.url.as_str()).await.unwrap();
        socket.send(Message::Text("{not json".into())).await.unwrap();
        let first = read_json_except(&mut socket, "tick").await;
        assert_eq!(first["type"], "connected");
    }

    flood.abort();
}

#[tokio::test]
async fn zero_command_buffer_is_rejected_at_bind() {
    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        command_buffer: 0,
        ..ServerConfig::default()
    };
    let result = Server::bind(config).await;
    assert!(matches!(result, Err(AppError::Config(_))));
}
