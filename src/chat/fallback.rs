use log::{debug, error};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::SessionEvent;
use crate::api::ChatApi;
use crate::models::MessageDraft;

/// Delivers a message over HTTP while the push channel is down.
/// One request per message, no retry; the outcome comes back as a session event.
#[derive(Clone)]
pub struct FallbackSender {
    api: Arc<dyn ChatApi>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl FallbackSender {
    pub fn new(api: Arc<dyn ChatApi>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        FallbackSender { api, events }
    }

    pub fn send(&self, draft: MessageDraft) {
        let api = self.api.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = api.send_message(&draft).await;
            match &result {
                Ok(saved) => debug!("Fallback send to {} stored as {:?}", draft.receiver_id, saved.id),
                Err(e) => error!("Fallback send to {} failed: {}", draft.receiver_id, e),
            }
            let _ = events.send(SessionEvent::SendFinished { draft, result });
        });
    }
}
