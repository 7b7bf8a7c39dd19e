//! Router actor implementation
//!
//! The central actor that owns the connection registry and produces every
//! envelope after the welcome: broadcast, echo, parse errors, and
//! collaborator broadcasts. Replies to one connection therefore leave in
//! the order its frames arrived.
//! Uses the Actor pattern with mpsc channels for message passing.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::Envelope;
use crate::registry::ConnectionRegistry;
use crate::types::ConnectionId;

/// Commands sent to the Router actor
#[derive(Debug)]
pub enum RouterCommand {
    /// New connection accepted
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<Envelope>,
    },
    /// Connection closed or failed
    Disconnect { connection_id: ConnectionId },
    /// Valid inbound payload to broadcast to peers and echo to the sender
    Relay {
        connection_id: ConnectionId,
        payload: Value,
    },
    /// Inbound frame that failed to parse; reply to the sender only
    Reject {
        connection_id: ConnectionId,
        error: String,
    },
    /// Collaborator broadcast to every open connection
    Broadcast { envelope: Envelope },
    /// Query the number of registered connections
    LiveCount { reply: oneshot::Sender<usize> },
}

/// The Router actor
///
/// Processes commands one at a time, so the registry needs no locking and
/// every fan-out sees the membership left by all earlier commands.
pub struct Router {
    /// All registered connections
    registry: ConnectionRegistry,
    /// Command receiver channel
    receiver: mpsc::Receiver<RouterCommand>,
}

impl Router {
    /// Create a new Router with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RouterCommand>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            receiver,
        }
    }

    /// Create a Router together with a handle for talking to it
    pub fn channel(buffer: usize) -> (Self, RouterHandle) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(receiver), RouterHandle { sender })
    }

    /// Run the Router event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Router started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Router shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Connect {
                connection_id,
                sender,
            } => self.handle_connect(connection_id, sender),
            RouterCommand::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            RouterCommand::Relay {
                connection_id,
                payload,
            } => self.handle_relay(connection_id, payload),
            RouterCommand::Reject {
                connection_id,
                error,
            } => self.handle_reject(connection_id, error),
            RouterCommand::Broadcast { envelope } => self.handle_broadcast(envelope),
            RouterCommand::LiveCount { reply } => {
                let _ = reply.send(self.registry.live_count());
            }
        }
    }

    /// Register a connection whose welcome is already queued
    fn handle_connect(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<Envelope>) {
        self.registry.add(Connection::new(connection_id, sender));
        info!(
            "Connection {} registered. Total: {}",
            connection_id,
            self.registry.live_count()
        );
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if self.registry.remove(connection_id).is_some() {
            info!(
                "Connection {} removed. Total: {}",
                connection_id,
                self.registry.live_count()
            );
        }
    }

    /// Broadcast a payload to every other open connection, then echo it back
    fn handle_relay(&mut self, connection_id: ConnectionId, payload: Value) {
        let broadcast = Envelope::broadcast(payload.clone());
        let mut peers = 0;
        self.registry.for_each(|connection| {
            if connection.id != connection_id {
                deliver(connection, broadcast.clone());
                peers += 1;
            }
        });
        debug!("Relayed payload from {} to {} peer(s)", connection_id, peers);

        match self.registry.get(connection_id) {
            Some(sender) if sender.is_open() => deliver(sender, Envelope::echo(payload)),
            _ => debug!("Skipping echo, connection {} is gone", connection_id),
        }
    }

    fn handle_reject(&mut self, connection_id: ConnectionId, error: String) {
        match self.registry.get(connection_id) {
            Some(sender) if sender.is_open() => deliver(sender, Envelope::error(error)),
            _ => debug!("Skipping error reply, connection {} is gone", connection_id),
        }
    }

    fn handle_broadcast(&mut self, envelope: Envelope) {
        let recipients = self
            .registry
            .for_each(|connection| deliver(connection, envelope.clone()));
        debug!("Broadcast '{}' to {} connection(s)", envelope.kind(), recipients);
    }
}

/// Send to one connection, logging instead of propagating failures
fn deliver(connection: &Connection, envelope: Envelope) {
    if let Err(e) = connection.send(envelope) {
        warn!("Failed to send to connection {}: {}", connection.id, e);
    }
}

/// Cloneable handle to the Router actor
///
/// This is the only write path into the messaging layer for code outside
/// it: [`RouterHandle::broadcast`] notifies every connected client.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Send an envelope to every currently-open connection
    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), AppError> {
        self.command(RouterCommand::Broadcast { envelope }).await
    }

    /// Number of connections registered and not yet removed
    pub async fn live_count(&self) -> Result<usize, AppError> {
        let (reply, rx) = oneshot::channel();
        self.command(RouterCommand::LiveCount { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    pub(crate) async fn connect(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Envelope>,
    ) -> Result<(), AppError> {
        self.command(RouterCommand::Connect {
            connection_id,
            sender,
        })
        .await
    }

    pub(crate) async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        self.command(RouterCommand::Disconnect { connection_id })
            .await
    }

    pub(crate) async fn relay(
        &self,
        connection_id: ConnectionId,
        payload: Value,
    ) -> Result<(), AppError> {
        self.command(RouterCommand::Relay {
            connection_id,
            payload,
        })
        .await
    }

    pub(crate) async fn reject(
        &self,
        connection_id: ConnectionId,
        error: impl Into<String>,
    ) -> Result<(), AppError> {
        self.command(RouterCommand::Reject {
            connection_id,
            error: error.into(),
        })
        .await
    }

    async fn command(&self, cmd: RouterCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}
