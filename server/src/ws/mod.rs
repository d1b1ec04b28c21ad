pub mod actor;
pub mod handler;
pub mod protocol;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, watch};

use crate::hub::{SendError, Transport};

/// Transport backed by a WebSocket actor.
///
/// Frames go through a bounded channel to the actor's writer task. `close`
/// flips a watch flag the reader loop and writer task both listen on.
pub struct WsTransport {
    tx: mpsc::Sender<Message>,
    shutdown: watch::Sender<bool>,
}

impl WsTransport {
    pub fn new(tx: mpsc::Sender<Message>, shutdown: watch::Sender<bool>) -> Self {
        Self { tx, shutdown }
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: String) -> Result<(), SendError> {
        self.tx
            .try_send(Message::Text(frame.into()))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SendError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
    }
}
