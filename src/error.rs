//! Error types for the relay
//!
//! Defines server-side errors, per-recipient send errors, and the errors a
//! client observes through its `connect()` future.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Server-side application errors
///
/// All of these end the affected connection (or stop the server on
/// startup); protocol errors never show up here because they are answered
/// with an `error` envelope instead.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - router actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Message send errors
///
/// Occurs when handing an envelope to a single connection's writer. Always
/// scoped to that one recipient.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection's outbound buffer is full (slow reader)
    #[error("Channel full")]
    ChannelFull,
}

/// Errors reported by the reconnecting client
///
/// Cloneable because one failure may settle several pending `connect()`
/// futures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The first attempt of a connection lineage failed
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// `disconnect()` was called before the attempt finished
    #[error("Disconnected")]
    Disconnected,

    /// The client's background task has stopped
    #[error("Client task stopped")]
    ActorGone,
}

/// Error returned by an inbound message handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
