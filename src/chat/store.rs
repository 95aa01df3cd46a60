// Conversation store: the single point where contacts and the active conversation change
// Every mutation from fetch, push, poll and local send goes through here

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::models::{Contact, Message, MessageDraft, MessageId, UserId, WireMessage};

/// Selection lifecycle of the active conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading(UserId),
    Ready(UserId),
}

/// Where a pushed message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended to the open conversation
    Appended,
    /// Counterpart is not active; its contact was flagged unread
    Flagged(UserId),
    /// Not addressed to or from the current user
    Ignored,
}

/// Monotonic local ids derived from the wall clock (milliseconds)
#[derive(Debug, Default)]
struct LocalClock {
    last: i64,
}

impl LocalClock {
    fn next(&mut self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        self.last = if candidate > self.last { candidate } else { self.last + 1 };
        self.last
    }
}

#[derive(Debug)]
pub struct ConversationStore {
    me: UserId,
    contacts: Vec<Contact>,
    phase: Phase,
    messages: Vec<Message>,
    clock: LocalClock,
}

impl ConversationStore {
    pub fn new(me: UserId) -> Self {
        ConversationStore {
            me,
            contacts: Vec::new(),
            phase: Phase::Idle,
            messages: Vec::new(),
            clock: LocalClock::default(),
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact(&self, id: UserId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_contact(&self) -> Option<UserId> {
        match self.phase {
            Phase::Idle => None,
            Phase::Loading(id) | Phase::Ready(id) => Some(id),
        }
    }

    pub fn is_active(&self, contact: UserId) -> bool {
        self.active_contact() == Some(contact)
    }

    /// Replace the contact list, keeping unread flags the session already derived
    pub fn set_contacts(&mut self, contacts: Vec<Contact>) {
        let previous = std::mem::take(&mut self.contacts);
        self.contacts = contacts
            .into_iter()
            .map(|mut contact| {
                contact.unread = previous.iter().any(|p| p.id == contact.id && p.unread);
                contact
            })
            .collect();
        // A selection made before the list arrived keeps its contact visible
        if let Some(active) = self.active_contact() {
            self.ensure_contact(active);
        }
        debug!("Contact list now has {} entries", self.contacts.len());
    }

    fn ensure_contact(&mut self, id: UserId) -> &mut Contact {
        let idx = match self.contacts.iter().position(|c| c.id == id) {
            Some(idx) => idx,
            None => {
                self.contacts.insert(0, Contact::placeholder(id));
                0
            }
        };
        &mut self.contacts[idx]
    }

    /// Start a new selection: discard the old conversation, clear unread, enter Loading
    pub fn select(&mut self, contact: UserId) {
        self.ensure_contact(contact).unread = false;
        self.messages.clear();
        self.phase = Phase::Loading(contact);
        debug!("Selected contact {}", contact);
    }

    pub fn clear_selection(&mut self) {
        self.messages.clear();
        self.phase = Phase::Idle;
    }

    /// Result of the one-shot fetch issued at selection time.
    /// Returns false when `contact` is no longer active and the result was dropped.
    pub fn apply_conversation(&mut self, contact: UserId, messages: Vec<Message>) -> bool {
        if !self.is_active(contact) {
            debug!("Discarding stale conversation for {} ({} messages)", contact, messages.len());
            return false;
        }
        self.messages = messages;
        self.phase = Phase::Ready(contact);
        true
    }

    /// Poll refresh: wholesale replacement, unconfirmed local entries included
    pub fn apply_poll(&mut self, contact: UserId, messages: Vec<Message>) -> bool {
        if !self.is_active(contact) {
            debug!("Discarding stale poll result for {}", contact);
            return false;
        }
        let dropped_local = self.messages.iter().filter(|m| m.id.is_local()).count();
        if dropped_local > 0 {
            debug!("Poll for {} replaced {} unconfirmed local message(s)", contact, dropped_local);
        }
        self.messages = messages;
        self.phase = Phase::Ready(contact);
        true
    }

    /// Push delivery. Duplicates are appended as delivered.
    pub fn apply_push(&mut self, wire: WireMessage) -> PushOutcome {
        let now = Utc::now();
        let clock = &mut self.clock;
        let message = wire.into_message(|| clock.next(now), now);

        let counterpart = match message.counterpart(self.me) {
            Some(id) => id,
            None => {
                warn!(
                    "Ignoring pushed message {} -> {} not involving user {}",
                    message.sender_id, message.receiver_id, self.me
                );
                return PushOutcome::Ignored;
            }
        };

        match self.active_contact() {
            Some(active) if message.involves(active) => {
                self.ensure_contact(active).preview = Some(message.content.clone());
                self.messages.push(message);
                PushOutcome::Appended
            }
            _ => {
                let contact = self.ensure_contact(counterpart);
                contact.preview = Some(message.content);
                contact.unread = true;
                PushOutcome::Flagged(counterpart)
            }
        }
    }

    /// Optimistic append for a local send; returns the visible entry
    pub fn append_optimistic(&mut self, draft: &MessageDraft) -> Message {
        let now = Utc::now();
        let message = Message {
            id: MessageId::Local(self.clock.next(now)),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content.clone(),
            timestamp: now,
        };
        self.ensure_contact(draft.receiver_id).preview = Some(draft.content.clone());
        self.messages.push(message.clone());
        message
    }
}
