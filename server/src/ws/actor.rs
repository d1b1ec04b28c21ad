use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};

use crate::hub::Transport;
use crate::proto::ServerMessage;
use crate::state::AppState;
use crate::ws::{protocol, WsTransport};

/// Close code sent when the server shuts a connection down
/// (auth timeout, pong timeout, server shutdown).
const CLOSE_BY_SERVER: u16 = 4008;

/// Time the writer gets to flush the close frame after a server-side close.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from a bounded mpsc channel
/// - Ping task: sends periodic pings and closes the connection on pong timeout
/// - Auth watchdog: closes the connection if it never authenticates
/// - Reader loop (this task): decodes frames and dispatches them to the hub
///
/// The connection is registered with the hub for its whole lifetime; the hub
/// reaches it through a [`WsTransport`] wrapping the channel sender.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.outbound_buffer.max(1));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let transport = Arc::new(WsTransport::new(tx.clone(), shutdown_tx));
    let handle = state.hub.connect(transport.clone());
    let watchdog_handle = state.hub.spawn_auth_watchdog(handle);

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, shutdown_rx.clone()));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_transport = transport.clone();
    let ping_interval = state.ping_interval;
    let pong_timeout = state.pong_timeout;
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(connection = %handle, "Pong timeout, closing connection");
                    ping_transport.close();
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let msg = tokio::select! {
            msg = ws_receiver.next() => msg,
            _ = shutdown_rx.changed() => {
                tracing::info!(connection = %handle, "Connection closed by server");
                break;
            }
        };

        match msg {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    let replies = protocol::handle_text_message(text.as_str(), handle, &state.hub);
                    if !send_replies(&tx, replies).await {
                        break;
                    }
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection = %handle,
                        bytes = data.len(),
                        "Ignoring binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    if tx.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection = %handle,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection = %handle,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection = %handle, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: stop background tasks and leave all rooms
    watchdog_handle.abort();
    ping_handle.abort();
    state.hub.disconnect(handle);

    // A server-side close gets a chance to flush its close frame; queued
    // deliveries are dropped either way.
    if *shutdown_rx.borrow() {
        let _ = timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await;
    }
    writer_handle.abort();
}

/// Send replies to this connection's own writer, waiting for buffer capacity.
/// Returns false once the writer is gone.
async fn send_replies(tx: &mpsc::Sender<Message>, replies: Vec<ServerMessage>) -> bool {
    for reply in replies {
        match reply.to_frame() {
            Ok(frame) => {
                if tx.send(Message::Text(frame.into())).await.is_err() {
                    return false;
                }
            }
            Err(err) => {
                tracing::error!(event = reply.name(), error = %err, "Failed to serialize reply");
            }
        }
    }
    true
}

/// Writer task: receives frames from the mpsc channel and forwards them to the
/// WebSocket sink. A server-side close preempts anything still queued.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                let _ = ws_sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_BY_SERVER,
                        reason: "Connection closed by server".into(),
                    })))
                    .await;
                break;
            }
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if ws_sender.send(msg).await.is_err() {
                        // WebSocket send failed — connection is broken
                        break;
                    }
                }
                None => break,
            },
        }
    }
}
