//! WebSocket connection handler
//!
//! Handles individual connections: WebSocket handshake on the configured
//! path, frame parsing, and bidirectional communication with the Router.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{payload_from_frame, Envelope, INVALID_JSON};
use crate::router::RouterHandle;
use crate::types::ConnectionId;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, queues the welcome, registers with the
/// Router, and pumps frames in both directions until either side closes.
pub async fn handle_connection(
    stream: TcpStream,
    router: RouterHandle,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, only on the configured path
    let expected_path = config.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some("Not Found".to_string()));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Channel for router -> socket envelopes
    let (msg_tx, mut msg_rx) = mpsc::channel::<Envelope>(config.connection_buffer);

    // Welcome goes out before any inbound frame is read
    msg_tx
        .send(Envelope::connected())
        .await
        .map_err(|_| AppError::ChannelSend)?;

    // Register with Router; every later envelope to this connection comes from it
    if router.connect(connection_id, msg_tx).await.is_err() {
        error!(
            "Failed to register connection {} - router closed",
            connection_id
        );
        return Err(AppError::ChannelSend);
    }

    let router_read = router.clone();

    // Spawn read task (WebSocket -> Router)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            let frame = match msg_result {
                Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    // Pong replies are handled by tungstenite
                    continue;
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            };

            match payload_from_frame(&frame) {
                Ok(payload) => {
                    if router_read.relay(connection_id, payload).await.is_err() {
                        debug!("Router closed, ending read task for {}", connection_id);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Invalid JSON from {}: {}", connection_id, e);
                    if router_read.reject(connection_id, INVALID_JSON).await.is_err() {
                        debug!("Router closed, ending read task for {}", connection_id);
                        break;
                    }
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Spawn write task (Envelope -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(envelope) = msg_rx.recv().await {
            match envelope.to_json() {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize envelope: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for {}", connection_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", connection_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", connection_id);
            read_task.abort();
        }
    }

    // Dropping the Router's sender lets the write task drain and close
    let _ = router.disconnect(connection_id).await;

    info!("Connection {} closed", connection_id);

    Ok(())
}
