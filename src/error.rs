use thiserror::Error;

/// Errors surfaced by the chat core and its collaborators
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("persisted message without an id")]
    MissingId,

    #[error("push channel is not connected")]
    NotConnected,

    #[error("push channel is closed")]
    TransportClosed,

    #[error("message body is empty")]
    EmptyMessage,

    #[error("no conversation is active")]
    NoActiveContact,
}

pub type Result<T> = std::result::Result<T, ChatError>;
