//! Connection struct definition
//!
//! Represents one accepted socket as seen by the router: its identity and
//! the channel feeding that socket's writer task.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Envelope;
use crate::types::ConnectionId;

/// Live server-side connection
///
/// The connection is OPEN while its writer task still holds the receiving
/// end of `sender`; once the writer ends (socket closed or failed) the
/// connection counts as CLOSED and is never written to again.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Router → writer task channel
    sender: mpsc::Sender<Envelope>,
}

impl Connection {
    /// Create a new connection with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Envelope>) -> Self {
        Self { id, sender }
    }

    /// Whether the writer side is still accepting envelopes
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Hand an envelope to this connection's writer without waiting
    ///
    /// Fails if the connection closed or its buffer is full. Callers log and
    /// move on; a failure here never affects other connections.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_send() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Connection::new(ConnectionId::new(), tx);

        assert!(conn.is_open());
        conn.send(Envelope::connected()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), "connected");
    }

    #[tokio::test]
    async fn test_connection_closed() {
        let (tx, rx) = mpsc::channel(4);
        let conn = Connection::new(ConnectionId::new(), tx);
        drop(rx);

        assert!(!conn.is_open());
        assert_eq!(
            conn.send(Envelope::connected()),
            Err(SendError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_connection_full() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), tx);

        conn.send(Envelope::connected()).unwrap();
        assert_eq!(
            conn.send(Envelope::connected()),
            Err(SendError::ChannelFull)
        );
    }
}
