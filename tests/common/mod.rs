#![allow(dead_code)]

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use ws_relay::{RouterHandle, Server, ServerConfig};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub url: String,
    pub router: RouterHandle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Run a relay on `listen` until the returned value is dropped
pub async fn start_server_on(listen: &str) -> TestServer {
    let config = ServerConfig::default().with_listen(listen.parse().unwrap());
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let router = server.router();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async move {
        let _ = shutdown_rx.await;
    }));

    TestServer {
        url: format!("ws://{}/ws", addr),
        router,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn start_server() -> TestServer {
    start_server_on("127.0.0.1:0").await
}

/// Read the next text frame as JSON
pub async fn read_json(socket: &mut Socket) -> Value {
    loop {
        let msg = timeout(READ_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

/// Open a raw socket and consume the welcome envelope
pub async fn join(url: &str) -> Socket {
    let (mut socket, _) = connect_async(url).await.expect("handshake failed");
    let welcome = read_json(&mut socket).await;
    assert_eq!(welcome["type"], "connected");
    socket
}

/// Assert nothing arrives for a short while
pub async fn assert_silent(socket: &mut Socket) {
    let result = timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

/// Poll the router until it reports `expected` connections
pub async fn wait_for_live_count(router: &RouterHandle, expected: usize) {
    timeout(READ_TIMEOUT, async {
        loop {
            if router.live_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("live count never reached expected value");
}
