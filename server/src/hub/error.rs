use thiserror::Error;

/// Registry mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection is already authenticated")]
    AlreadyAuthenticated,
    #[error("unknown connection")]
    UnknownConnection,
}

/// Rejections raised before an event is dispatched. Never delivered to anyone
/// but the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message body is empty")]
    EmptyMessage,
    #[error("invalid order status: {0}")]
    InvalidStatus(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown order: {0}")]
    UnknownOrder(String),
    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),
}

/// Errors surfaced by the hub to a submitting connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("connection is not authenticated")]
    NotAuthenticated,
}
