//! WebSocket Relay Library
//!
//! A real-time messaging layer built with tokio-tungstenite: a server that
//! echoes and broadcasts JSON envelopes among connected clients, and a
//! client that reconnects with exponential backoff.
//!
//! # Features
//! - WebSocket endpoint on a fixed path (default `/ws`)
//! - Welcome envelope on connect
//! - Broadcast of every valid message to all other open connections
//! - Echo back to the sender
//! - `error` envelope for frames that aren't valid JSON
//! - External `broadcast` hook for collaborators
//! - Client with reconnect backoff + jitter, outbound queue, typed handlers
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Router` is the server-side actor owning the connection registry
//! - Each connection has a `handler` task communicating with the Router
//! - `WsClient` is a handle to a client actor driving the `Automaton`
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use serde_json::json;
//! use ws_relay::{Envelope, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ws_relay::AppError> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let router = server.router();
//!
//!     // Collaborators notify every client through the router handle
//!     tokio::spawn(async move {
//!         let _ = router
//!             .broadcast(Envelope::application("gallery_item_added", json!({"id": 1})))
//!             .await;
//!     });
//!
//!     server.run_until_ctrl_c().await
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{ConnectionState, WsClient};
pub use config::{ClientConfig, ServerConfig};
pub use connection::Connection;
pub use error::{AppError, ClientError, SendError};
pub use handler::handle_connection;
pub use message::{Body, Envelope};
pub use registry::ConnectionRegistry;
pub use router::{Router, RouterCommand, RouterHandle};
pub use server::Server;
pub use types::ConnectionId;
