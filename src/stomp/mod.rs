// Push channel: STOMP over WebSocket
// The connection owns its reconnect loop; the chat session only reads its state and publishes

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{ConnectionState, MessageDraft};

pub mod connection;
pub mod frame;

pub use connection::StompTransport;
pub use frame::Frame;

/// Publish/subscribe connection as seen by the chat session.
/// Inbound messages are handed out once, as a receiver, when the channel is created.
#[async_trait]
pub trait PushChannel: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Watch for state changes; there is exactly one writer
    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// Fire-and-forget send. Fails with `NotConnected` instead of queueing.
    fn publish(&self, draft: &MessageDraft) -> Result<()>;

    /// Graceful teardown; stops the reconnect loop
    async fn disconnect(&self);
}
