use thiserror::Error;

/// Per-connection delivery failure. Isolated to the connection it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("outbound buffer full")]
    BufferFull,
    #[error("connection closed")]
    Closed,
}

/// Outbound half of one live connection.
///
/// The registry and dispatcher only ever talk to connections through this
/// trait; the WebSocket actor provides the production implementation.
/// `send` must not block: a slow peer reports [`SendError::BufferFull`].
pub trait Transport: Send + Sync {
    /// Queue one serialized frame for delivery.
    fn send(&self, frame: String) -> Result<(), SendError>;

    /// Ask the transport to shut down. Frames still queued are dropped.
    fn close(&self);
}
