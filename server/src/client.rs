//! Reconnecting hub client.
//!
//! [`connect`] spawns a session task that keeps one WebSocket open to the hub,
//! authenticates on every (re)connect and forwards the subscribed server
//! events to an [`EventStream`]. Dropped connections are retried with
//! exponential backoff until [`HubClient::shutdown`] is called.

use futures_util::{SinkExt, Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::hub::{Broadcast, Identity, OrderDetails};
use crate::proto::{ClientMessage, ServerMessage, StatusUpdateRequest, TestMessageRequest};

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client has been shut down")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL, e.g. `ws://localhost:3001/ws`
    pub url: String,
    /// Identity asserted after every connect
    pub identity: Identity,
    /// Event names to forward. Empty forwards everything.
    pub subscriptions: HashSet<String>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Capacity of the event and command channels
    pub buffer: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, identity: Identity) -> Self {
        Self {
            url: url.into(),
            identity,
            subscriptions: HashSet::new(),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            buffer: 64,
        }
    }

    pub fn subscribe(mut self, event: impl Into<String>) -> Self {
        self.subscriptions.insert(event.into());
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    fn wants(&self, event: &str) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.contains(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connecting,
    /// Socket open and `authenticated` received.
    Connected,
    /// Waiting before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// The hub refused the identity. Terminal; no reconnect is attempted.
    Rejected,
    Closed,
}

/// Handle for sending frames and controlling the session task.
pub struct HubClient {
    commands: mpsc::Sender<ClientMessage>,
    status: watch::Receiver<ClientStatus>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Subscribed server events, in arrival order.
pub struct EventStream {
    rx: mpsc::Receiver<ServerMessage>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = ServerMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start a client session. Must be called inside a tokio runtime.
pub fn connect(config: ClientConfig) -> (HubClient, EventStream) {
    let buffer = config.buffer.max(1);
    let (command_tx, command_rx) = mpsc::channel(buffer);
    let (event_tx, event_rx) = mpsc::channel(buffer);
    let (status_tx, status_rx) = watch::channel(ClientStatus::Connecting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(session_loop(
        config,
        command_rx,
        event_tx,
        status_tx,
        shutdown_rx,
    ));

    (
        HubClient {
            commands: command_tx,
            status: status_rx,
            shutdown: shutdown_tx,
            task,
        },
        EventStream { rx: event_rx },
    )
}

impl HubClient {
    /// Queue a frame. Frames queued while disconnected go out after the next
    /// successful authentication.
    pub async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.commands
            .send(message)
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn send_test_message(&self, broadcast: Broadcast) -> Result<(), ClientError> {
        self.send(ClientMessage::SendTestMessage(TestMessageRequest {
            message: broadcast.message,
            target_role: broadcast.target_role,
        }))
        .await
    }

    pub async fn send_order_notification(&self, order: OrderDetails) -> Result<(), ClientError> {
        self.send(ClientMessage::SendOrderNotification(order)).await
    }

    pub async fn update_order_status(&self, request: StatusUpdateRequest) -> Result<(), ClientError> {
        self.send(ClientMessage::UpdateOrderStatus(request)).await
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    /// Close the socket and stop reconnecting. Also returns promptly after the
    /// session has ended on its own (identity rejected).
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        let _ = self.task.await;
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
    Rejected,
}

async fn session_loop(
    config: ClientConfig,
    mut commands: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<ServerMessage>,
    status: watch::Sender<ClientStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = config.initial_backoff;
    let mut attempt = 0u32;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match connect_async(config.url.as_str()).await {
            Ok((socket, _)) => {
                tracing::info!(url = %config.url, user_id = %config.identity.id, "Connected to hub");
                match run_session(socket, &config, &mut commands, &events, &status, &mut shutdown)
                    .await
                {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Rejected => {
                        status.send_replace(ClientStatus::Rejected);
                        return;
                    }
                    SessionEnd::Lost => {
                        tracing::warn!(url = %config.url, "Hub connection lost");
                    }
                }
                backoff = config.initial_backoff;
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "Failed to connect to hub");
            }
        }

        attempt += 1;
        status.send_replace(ClientStatus::Reconnecting { attempt });
        tracing::debug!(attempt, delay_ms = backoff.as_millis() as u64, "Reconnecting");

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        backoff = (backoff * 2).min(config.max_backoff);
        status.send_replace(ClientStatus::Connecting);
    }

    status.send_replace(ClientStatus::Closed);
}

async fn run_session<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    config: &ClientConfig,
    commands: &mut mpsc::Receiver<ClientMessage>,
    events: &mpsc::Sender<ServerMessage>,
    status: &watch::Sender<ClientStatus>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = socket.split();

    let auth = ClientMessage::Authenticate(config.identity.clone());
    if !send_frame(&mut write, &auth).await {
        return SessionEnd::Lost;
    }

    // Commands wait until the hub has confirmed the identity
    let mut authenticated = false;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            command = commands.recv(), if authenticated => match command {
                Some(message) => {
                    if !send_frame(&mut write, &message).await {
                        return SessionEnd::Lost;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::debug!(error = %e, "Ignoring unrecognized hub frame");
                            continue;
                        }
                    };

                    let rejected = match &message {
                        ServerMessage::Authenticated(payload) if payload.success => {
                            authenticated = true;
                            status.send_replace(ClientStatus::Connected);
                            false
                        }
                        ServerMessage::Authenticated(payload) => {
                            tracing::warn!(error = ?payload.error, "Hub rejected identity");
                            true
                        }
                        _ => false,
                    };

                    if config.wants(message.name()) {
                        forward(events, message);
                    }

                    if rejected {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Rejected;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(reason = ?frame, "Hub closed the connection");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Hub receive error");
                    return SessionEnd::Lost;
                }
                None => return SessionEnd::Lost,
            },
        }
    }
}

/// Hand an event to the stream without waiting. An unread stream drops events
/// instead of stalling the socket.
fn forward(events: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    match events.try_send(message) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(message)) => {
            tracing::warn!(event = message.name(), "Event stream full, dropping event");
        }
        // A dropped EventStream is not a reason to disconnect
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

async fn send_frame<W>(write: &mut W, message: &ClientMessage) -> bool
where
    W: futures_util::Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    let frame = match serde_json::to_string(message) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(event = message.name(), error = %e, "Failed to serialize frame");
            return true;
        }
    };
    match write.send(Message::Text(frame.into())).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(event = message.name(), error = %e, "Failed to send frame");
            false
        }
    }
}
