// Common test utilities for integration tests
// Mock collaborators for the chat session plus logging setup
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::LevelFilter;
use tokio::sync::{mpsc, watch, Notify};

use golance_chat::chat::{ChatSession, SessionOptions};
use golance_chat::error::{ChatError, Result};
use golance_chat::models::{
    ConnectionState, Contact, Message, MessageDraft, MessageId, Notice, UserId, WireMessage,
};
use golance_chat::{ChatApi, PushChannel};

pub const ME: UserId = UserId(1);
pub const CAROL: UserId = UserId(2);
pub const DAVE: UserId = UserId(3);

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Contacts(UserId),
    Conversation(UserId, UserId),
    Send(MessageDraft),
}

/// In-memory backend that records every call
#[derive(Default)]
pub struct MockApi {
    contacts: Mutex<Vec<Contact>>,
    conversations: Mutex<HashMap<UserId, Vec<Message>>>,
    calls: Mutex<Vec<ApiCall>>,
    held: Mutex<HashMap<UserId, Arc<Notify>>>,
    fail_sends: AtomicBool,
    fail_conversations: AtomicBool,
    fail_contacts: AtomicBool,
}

impl MockApi {
    pub fn new(contacts: Vec<Contact>) -> Arc<Self> {
        let api = MockApi::default();
        *api.contacts.lock().unwrap() = contacts;
        Arc::new(api)
    }

    pub fn set_conversation(&self, contact: UserId, messages: Vec<Message>) {
        self.conversations.lock().unwrap().insert(contact, messages);
    }

    /// Conversation fetches for `contact` block until `release`
    pub fn hold(&self, contact: UserId) {
        self.held.lock().unwrap().insert(contact, Arc::new(Notify::new()));
    }

    pub fn release(&self, contact: UserId) {
        if let Some(gate) = self.held.lock().unwrap().remove(&contact) {
            gate.notify_one();
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_conversations(&self, fail: bool) {
        self.fail_conversations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_contacts(&self, fail: bool) {
        self.fail_contacts.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn conversation_fetches(&self, contact: UserId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Conversation(_, c) if *c == contact))
            .count()
    }

    pub fn sends(&self) -> Vec<MessageDraft> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Send(draft) => Some(draft),
                _ => None,
            })
            .collect()
    }

    fn unavailable() -> ChatError {
        ChatError::Status {
            status: 503,
            body: "backend unavailable".to_string(),
        }
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn fetch_contacts(&self, user: UserId) -> Result<Vec<Contact>> {
        self.calls.lock().unwrap().push(ApiCall::Contacts(user));
        if self.fail_contacts.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn fetch_conversation(&self, user: UserId, contact: UserId) -> Result<Vec<Message>> {
        self.calls.lock().unwrap().push(ApiCall::Conversation(user, contact));
        let gate = self.held.lock().unwrap().get(&contact).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(&contact)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        self.calls.lock().unwrap().push(ApiCall::Send(draft.clone()));
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(Message {
            id: MessageId::Server(1000),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content.clone(),
            timestamp: Utc::now(),
        })
    }
}

/// Push channel whose state the test controls
pub struct MockPush {
    state: watch::Sender<ConnectionState>,
    published: Mutex<Vec<MessageDraft>>,
    disconnected: AtomicBool,
}

impl MockPush {
    pub fn new(state: ConnectionState) -> Arc<Self> {
        let (tx, _) = watch::channel(state);
        Arc::new(MockPush {
            state: tx,
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn published(&self) -> Vec<MessageDraft> {
        self.published.lock().unwrap().clone()
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for MockPush {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn publish(&self, draft: &MessageDraft) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        self.published.lock().unwrap().push(draft.clone());
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

pub struct Harness {
    pub session: ChatSession,
    pub api: Arc<MockApi>,
    pub push: Arc<MockPush>,
    pub inbound: mpsc::Sender<WireMessage>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

pub fn default_contacts() -> Vec<Contact> {
    vec![Contact::new(CAROL, "carol"), Contact::new(DAVE, "dave")]
}

pub fn harness(state: ConnectionState) -> Harness {
    harness_with(MockApi::new(default_contacts()), state, SessionOptions::default())
}

pub fn harness_with(api: Arc<MockApi>, state: ConnectionState, options: SessionOptions) -> Harness {
    setup_logging();
    let push = MockPush::new(state);
    let (inbound, inbound_rx) = mpsc::channel(16);
    let (session, notices) = ChatSession::new(
        ME,
        api.clone() as Arc<dyn ChatApi>,
        push.clone() as Arc<dyn PushChannel>,
        inbound_rx,
        options,
    );
    Harness {
        session,
        api,
        push,
        inbound,
        notices,
    }
}

pub fn wire(from: UserId, to: UserId, content: &str) -> WireMessage {
    WireMessage {
        id: None,
        sender_id: from,
        receiver_id: to,
        content: content.to_string(),
        timestamp: Some(Utc::now()),
    }
}

pub fn persisted(id: i64, from: UserId, to: UserId, content: &str) -> Message {
    Message {
        id: MessageId::Server(id),
        sender_id: from,
        receiver_id: to,
        content: content.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    }
}

pub fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.content.as_str()).collect()
}
