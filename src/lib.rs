// Re-export needed modules for testing
pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod stomp;

// Re-export main types for convenience
pub use api::{ChatApi, RestApi};
pub use chat::{ChatSession, ChatView, Command, SessionOptions};
pub use config::ChatConfig;
pub use error::ChatError;
pub use models::*;
pub use stomp::{PushChannel, StompTransport};
