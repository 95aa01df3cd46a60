use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::SessionEvent;
use crate::api::ChatApi;
use crate::models::UserId;

/// Safety-net refresh of one conversation.
/// Owns its timer task: dropping the poller cancels the timer and any fetch in flight.
pub struct Poller {
    contact: UserId,
    handle: JoinHandle<()>,
}

impl Poller {
    /// First tick fires one full `period` after start
    pub fn start(
        api: Arc<dyn ChatApi>,
        me: UserId,
        contact: UserId,
        period: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match api.fetch_conversation(me, contact).await {
                    Ok(messages) => {
                        if events.send(SessionEvent::PollRefreshed { contact, messages }).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Poll for conversation with {} failed: {}", contact, e),
                }
            }
        });
        debug!("Polling conversation with {} every {:?}", contact, period);
        Poller { contact, handle }
    }

    pub fn contact(&self) -> UserId {
        self.contact
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Stopped polling conversation with {}", self.contact);
    }
}
