//! Reconnecting WebSocket client
//!
//! [`WsClient`] is a cheap handle to a background actor task that owns the
//! socket, the reconnect timer, the outbound queue and the handler
//! registry. All state lives on that one task, so nothing here is locked.
//!
//! # Example
//! ```ignore
//! use serde_json::json;
//! use ws_relay::client::{handler, WsClient};
//! use ws_relay::config::ClientConfig;
//!
//! let client = WsClient::new(ClientConfig::new("ws://127.0.0.1:3001/ws"));
//! client.on("echo", handler(|env| {
//!     println!("echoed: {:?}", env.data());
//!     Ok(())
//! }));
//! // Queued, then flushed once the implicit connect succeeds
//! client.send("chat", json!("hi"));
//! ```

pub mod automaton;
pub mod backoff;
pub mod dispatch;
pub mod queue;

use std::future::{pending, Future};
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, SendError};
use crate::message::Envelope;

pub use automaton::{Action, Automaton, ConnectionState, Event};
pub use backoff::Backoff;
pub use dispatch::{handler, ErrorSink, Handler, HandlerRegistry};
pub use queue::OutboundQueue;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OpenFuture = Pin<Box<dyn Future<Output = Result<WsStream, tungstenite::Error>> + Send>>;
type ConnectReply = oneshot::Sender<Result<(), ClientError>>;

/// Snapshot of the client's automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: ConnectionState,
    pub attempts: u32,
}

/// Commands sent from the handle to the client actor
enum ClientCommand {
    Connect { reply: Option<ConnectReply> },
    Send { envelope: Envelope },
    On { kind: String, handler: Handler },
    Off { kind: String, handler: Handler },
    Disconnect,
}

/// Handle to one logical, self-reconnecting connection
///
/// Dropping the handle stops the background task and closes the socket.
pub struct WsClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    status: watch::Receiver<Status>,
}

impl WsClient {
    /// Create a client in `DISCONNECTED` state
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_handlers(config, HandlerRegistry::new())
    }

    /// Create a client with a pre-built handler registry (e.g. custom error sink)
    pub fn with_handlers(config: ClientConfig, handlers: HandlerRegistry) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let automaton = Automaton::from_config(&config);
        let (status_tx, status) = watch::channel(Status {
            state: automaton.state(),
            attempts: automaton.attempts(),
        });

        let actor = ClientActor {
            url: config.url,
            automaton,
            queue: OutboundQueue::new(),
            handlers,
            commands: receiver,
            status: status_tx,
            opening: None,
            reader: None,
            writer: None,
            reconnect_timer: None,
            waiters: Vec::new(),
        };
        tokio::spawn(actor.run());

        Self { commands, status }
    }

    /// Connect, resolving with the outcome of the first attempt
    ///
    /// Later automatic reconnects are only visible through [`state`](Self::state)
    /// and the registered handlers.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(ClientCommand::Connect { reply: Some(reply) })?;
        rx.await.map_err(|_| ClientError::ActorGone)?
    }

    /// Send an application envelope, queueing it while not connected
    ///
    /// Never blocks. Triggers a connect if the client is `DISCONNECTED`.
    pub fn send(&self, kind: impl Into<String>, data: Value) {
        self.send_envelope(Envelope::application(kind, data));
    }

    pub fn send_envelope(&self, envelope: Envelope) {
        if self.command(ClientCommand::Send { envelope }).is_err() {
            warn!("Client task stopped, message dropped");
        }
    }

    pub fn on(&self, kind: impl Into<String>, handler: Handler) {
        let _ = self.command(ClientCommand::On {
            kind: kind.into(),
            handler,
        });
    }

    pub fn off(&self, kind: impl Into<String>, handler: &Handler) {
        let _ = self.command(ClientCommand::Off {
            kind: kind.into(),
            handler: handler.clone(),
        });
    }

    /// Cancel any pending reconnect and close the socket; the queue is kept
    pub fn disconnect(&self) {
        let _ = self.command(ClientCommand::Disconnect);
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn attempts(&self) -> u32 {
        self.status().attempts
    }

    /// Wait until the automaton reaches `state`
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<Status, ClientError> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| ClientError::ActorGone)?;
        Ok(*reached)
    }

    fn command(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        self.commands.send(cmd).map_err(|_| ClientError::ActorGone)
    }
}

/// Background task driving the automaton
struct ClientActor {
    url: String,
    automaton: Automaton,
    queue: OutboundQueue,
    handlers: HandlerRegistry,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    status: watch::Sender<Status>,
    /// In-flight handshake
    opening: Option<OpenFuture>,
    reader: Option<SplitStream<WsStream>>,
    /// Feeds the writer task while the socket is open
    writer: Option<mpsc::UnboundedSender<Message>>,
    /// The single pending reconnect timer
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    /// `connect()` callers waiting on the current attempt
    waiters: Vec<ConnectReply>,
}

impl ClientActor {
    async fn run(mut self) {
        debug!("Client task started for {}", self.url);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                opened = poll_slot(&mut self.opening) => {
                    self.opening = None;
                    self.handle_open_result(opened);
                }
                frame = next_frame(&mut self.reader) => self.handle_frame(frame),
                () = poll_slot(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.apply(Event::TimerFired);
                }
            }
        }

        self.apply(Event::Disconnect);
        self.settle(Err(ClientError::Disconnected));
        debug!("Client task stopped for {}", self.url);
    }

    fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect { reply } => {
                if self.automaton.state() == ConnectionState::Open {
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                    return;
                }
                self.waiters.extend(reply);
                self.apply(Event::Connect);
            }
            ClientCommand::Send { envelope } => self.handle_send(envelope),
            ClientCommand::On { kind, handler } => self.handlers.on(kind, handler),
            ClientCommand::Off { kind, handler } => {
                self.handlers.off(&kind, &handler);
            }
            ClientCommand::Disconnect => {
                self.apply(Event::Disconnect);
                self.settle(Err(ClientError::Disconnected));
            }
        }
    }

    fn handle_send(&mut self, envelope: Envelope) {
        match self.automaton.state() {
            ConnectionState::Open => {
                if let Err(e) = transmit(&self.writer, &envelope) {
                    // Socket is going away; the close will show up on the reader
                    debug!("Transmit failed ({}), queueing message", e);
                    self.queue.enqueue(envelope);
                }
            }
            ConnectionState::Disconnected => {
                warn!("WebSocket is not connected, message queued");
                self.queue.enqueue(envelope);
                self.apply(Event::Connect);
            }
            ConnectionState::Connecting | ConnectionState::ReconnectWait => {
                debug!("Connection not open yet, message queued");
                self.queue.enqueue(envelope);
            }
        }
    }

    fn handle_open_result(&mut self, result: Result<WsStream, tungstenite::Error>) {
        match result {
            Ok(ws) => {
                let (sink, stream) = ws.split();
                self.reader = Some(stream);
                self.writer = Some(spawn_writer(sink));
                info!("WebSocket connected to {}", self.url);
                self.apply(Event::Opened);
                self.settle(Ok(()));
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.url, e);
                self.settle(Err(ClientError::ConnectFailed(e.to_string())));
                self.apply(Event::Closed);
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        let parsed = match frame {
            Some(Ok(Message::Text(text))) => Envelope::from_json(&text),
            Some(Ok(Message::Binary(data))) => serde_json::from_slice::<Envelope>(&data),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => return,
            Some(Ok(Message::Close(_))) | None => {
                info!("WebSocket disconnected");
                self.drop_transport();
                self.apply(Event::Closed);
                return;
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                self.drop_transport();
                self.apply(Event::Closed);
                return;
            }
        };

        match parsed {
            Ok(envelope) => {
                if envelope.is_error() {
                    warn!("Server reported an error: {:?}", envelope.body);
                }
                self.handlers.dispatch(&envelope);
            }
            Err(e) => error!("Error parsing WebSocket message: {}", e),
        }
    }

    /// Run the automaton and carry out its actions
    fn apply(&mut self, event: Event) {
        for action in self.automaton.handle(event) {
            self.perform(action);
        }
        self.status.send_replace(Status {
            state: self.automaton.state(),
            attempts: self.automaton.attempts(),
        });
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::OpenTransport => {
                let url = self.url.clone();
                self.opening = Some(Box::pin(async move {
                    connect_async(url).await.map(|(ws, _response)| ws)
                }));
            }
            Action::CloseTransport => self.drop_transport(),
            Action::FlushQueue => {
                let queued = self.queue.len();
                match self.queue.flush(|envelope| transmit(&self.writer, envelope)) {
                    Ok(sent) => debug!("Flushed {} queued message(s)", sent),
                    Err(e) => warn!(
                        "Flush stopped after {} of {} message(s): {}",
                        queued - self.queue.len(),
                        queued,
                        e
                    ),
                }
            }
            Action::ScheduleReconnect { attempt, delay } => {
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    self.automaton.max_attempts()
                );
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
            }
            Action::CancelTimer => self.reconnect_timer = None,
            Action::GiveUp => warn!(
                "Giving up on {} after {} attempt(s)",
                self.url,
                self.automaton.attempts()
            ),
        }
    }

    /// Drop the socket halves; the writer task sends a close frame on its way out
    fn drop_transport(&mut self) {
        self.opening = None;
        self.reader = None;
        self.writer = None;
    }

    /// Resolve every pending `connect()` with the same outcome
    fn settle(&mut self, outcome: Result<(), ClientError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Serialize and hand an envelope to the writer task
fn transmit(
    writer: &Option<mpsc::UnboundedSender<Message>>,
    envelope: &Envelope,
) -> Result<(), SendError> {
    let writer = writer.as_ref().ok_or(SendError::ChannelClosed)?;
    match envelope.to_json() {
        Ok(json) => writer
            .send(Message::Text(json.into()))
            .map_err(|_| SendError::ChannelClosed),
        Err(e) => {
            error!("Failed to serialize envelope: {}", e);
            Ok(())
        }
    }
}

/// Spawn the write task (Message -> WebSocket)
fn spawn_writer(mut sink: SplitSink<WsStream, Message>) -> mpsc::UnboundedSender<Message> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                debug!("WebSocket send failed, ending write task: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });
    tx
}

/// Await the future in `slot`, or never resolve when it is empty
async fn poll_slot<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_frame(
    reader: &mut Option<SplitStream<WsStream>>,
) -> Option<Result<Message, tungstenite::Error>> {
    match reader {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}
