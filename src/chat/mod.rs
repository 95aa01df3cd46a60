// Chat session for GoLance
// One event loop owns the conversation store; fetches, polls, pushes and sends all report back here

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub mod fallback;
pub mod poller;
pub mod store;

pub use fallback::FallbackSender;
pub use poller::Poller;
pub use store::{ConversationStore, Phase, PushOutcome};

use crate::api::ChatApi;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::models::{Contact, ConnectionState, Message, MessageDraft, Notice, UserId, WireMessage};
use crate::stomp::PushChannel;

/// Completions of work the session spawned
#[derive(Debug)]
pub enum SessionEvent {
    ContactsLoaded(Result<Vec<Contact>>),
    ConversationLoaded { contact: UserId, result: Result<Vec<Message>> },
    PollRefreshed { contact: UserId, messages: Vec<Message> },
    SendFinished { draft: MessageDraft, result: Result<Message> },
}

/// User intents fed to `ChatSession::run`
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectContact(UserId),
    ClearSelection,
    Send(String),
    ReloadContacts,
    Shutdown,
}

/// Snapshot handed to views after every change
#[derive(Debug, Clone, PartialEq)]
pub struct ChatView {
    pub me: UserId,
    pub contacts: Vec<Contact>,
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub connection: ConnectionState,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// One-shot "open this chat" handoff, consumed after the contact list loads
    pub resume_contact: Option<UserId>,
}

impl SessionOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        SessionOptions {
            poll_interval: config.poll_interval(),
            resume_contact: None,
        }
    }

    pub fn with_resume_contact(mut self, contact: UserId) -> Self {
        self.resume_contact = Some(contact);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::from_config(&ChatConfig::default())
    }
}

pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn PushChannel>,
    store: ConversationStore,
    poller: Option<Poller>,
    fallback: FallbackSender,
    poll_interval: Duration,
    resume_contact: Option<UserId>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    inbound: mpsc::Receiver<WireMessage>,
    inbound_open: bool,
    connection: watch::Receiver<ConnectionState>,
    connection_open: bool,
    view_tx: watch::Sender<ChatView>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl ChatSession {
    pub fn new(
        me: UserId,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn PushChannel>,
        inbound: mpsc::Receiver<WireMessage>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let connection = transport.subscribe_state();
        let store = ConversationStore::new(me);
        let (view_tx, _) = watch::channel(ChatView {
            me,
            contacts: Vec::new(),
            phase: Phase::Idle,
            messages: Vec::new(),
            connection: *connection.borrow(),
        });

        let session = ChatSession {
            fallback: FallbackSender::new(api.clone(), events_tx.clone()),
            api,
            transport,
            store,
            poller: None,
            poll_interval: options.poll_interval,
            resume_contact: options.resume_contact,
            events_tx,
            events_rx,
            inbound,
            inbound_open: true,
            connection,
            connection_open: true,
            view_tx,
            notices,
        };
        (session, notices_rx)
    }

    pub fn view(&self) -> watch::Receiver<ChatView> {
        self.view_tx.subscribe()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Contact whose conversation is currently being polled
    pub fn polling(&self) -> Option<UserId> {
        self.poller.as_ref().map(Poller::contact)
    }

    fn snapshot(&self) -> ChatView {
        ChatView {
            me: self.store.me(),
            contacts: self.store.contacts().to_vec(),
            phase: self.store.phase(),
            messages: self.store.messages().to_vec(),
            connection: *self.connection.borrow(),
        }
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(self.snapshot());
    }

    fn notify(&self, notice: Notice) {
        warn!("{}", notice);
        let _ = self.notices.send(notice);
    }

    pub fn load_contacts(&self) {
        let api = self.api.clone();
        let events = self.events_tx.clone();
        let me = self.store.me();
        tokio::spawn(async move {
            let result = api.fetch_contacts(me).await;
            let _ = events.send(SessionEvent::ContactsLoaded(result));
        });
    }

    /// Open a conversation: one fetch now, then a fresh poller for this contact only
    pub fn select_contact(&mut self, contact: UserId) {
        // The old timer goes before anything for the new contact starts
        self.poller = None;
        self.store.select(contact);

        let api = self.api.clone();
        let events = self.events_tx.clone();
        let me = self.store.me();
        tokio::spawn(async move {
            let result = api.fetch_conversation(me, contact).await;
            let _ = events.send(SessionEvent::ConversationLoaded { contact, result });
        });

        self.poller = Some(Poller::start(
            self.api.clone(),
            me,
            contact,
            self.poll_interval,
            self.events_tx.clone(),
        ));
        self.publish_view();
    }

    pub fn clear_selection(&mut self) {
        self.poller = None;
        self.store.clear_selection();
        self.publish_view();
    }

    /// Optimistic append, then publish when connected or fall back to HTTP otherwise.
    /// Delivery failures become notices; the appended message stays.
    pub fn send_message(&mut self, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let receiver = self.store.active_contact().ok_or(ChatError::NoActiveContact)?;

        let draft = MessageDraft {
            sender_id: self.store.me(),
            receiver_id: receiver,
            content: text.to_string(),
        };
        let optimistic = self.store.append_optimistic(&draft);
        self.publish_view();

        match self.transport.state() {
            ConnectionState::Connected => {
                debug!("Publishing message to {} over push channel", receiver);
                if let Err(e) = self.transport.publish(&draft) {
                    self.notify(Notice::PublishFailed(e.to_string()));
                }
            }
            state => {
                debug!("Push channel {:?}, sending to {} over HTTP", state, receiver);
                self.fallback.send(draft);
            }
        }
        Ok(optimistic)
    }

    pub fn apply_push(&mut self, wire: WireMessage) {
        match self.store.apply_push(wire) {
            PushOutcome::Appended => debug!("Pushed message appended to active conversation"),
            PushOutcome::Flagged(contact) => debug!("Pushed message flagged contact {} unread", contact),
            PushOutcome::Ignored => return,
        }
        self.publish_view();
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ContactsLoaded(Ok(contacts)) => {
                info!("Loaded {} contacts", contacts.len());
                self.store.set_contacts(contacts);
                if let Some(contact) = self.resume_contact.take() {
                    info!("Resuming chat with {}", contact);
                    self.select_contact(contact);
                }
            }
            SessionEvent::ContactsLoaded(Err(e)) => {
                error!("Failed to load contacts: {}", e);
                self.notify(Notice::ContactsLoadFailed(e.to_string()));
                if let Some(contact) = self.resume_contact.take() {
                    self.select_contact(contact);
                }
            }
            SessionEvent::ConversationLoaded { contact, result: Ok(messages) } => {
                if self.store.apply_conversation(contact, messages) {
                    debug!("Conversation with {} ready ({} messages)", contact, self.store.messages().len());
                }
            }
            SessionEvent::ConversationLoaded { contact, result: Err(e) } => {
                if self.store.is_active(contact) {
                    self.notify(Notice::ConversationLoadFailed {
                        contact,
                        reason: e.to_string(),
                    });
                } else {
                    debug!("Ignoring failed fetch for inactive contact {}: {}", contact, e);
                }
            }
            SessionEvent::PollRefreshed { contact, messages } => {
                self.store.apply_poll(contact, messages);
            }
            SessionEvent::SendFinished { result: Ok(_), .. } => {}
            SessionEvent::SendFinished { draft, result: Err(e) } => {
                self.notify(Notice::SendFailed {
                    content: draft.content,
                    reason: e.to_string(),
                });
            }
        }
        self.publish_view();
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectContact(contact) => self.select_contact(contact),
            Command::ClearSelection => self.clear_selection(),
            Command::ReloadContacts => self.load_contacts(),
            Command::Send(text) => match self.send_message(&text) {
                Ok(_) => {}
                Err(ChatError::EmptyMessage) => debug!("Ignoring empty message"),
                Err(ChatError::NoActiveContact) => self.notify(Notice::NoActiveContact),
                Err(e) => error!("Send failed: {}", e),
            },
            Command::Shutdown => {}
        }
    }

    /// Handle one completion, push or connection change. False once nothing can arrive.
    pub async fn process_next(&mut self) -> bool {
        tokio::select! {
            biased;
            Some(event) = self.events_rx.recv() => {
                self.apply(event);
                true
            }
            pushed = self.inbound.recv(), if self.inbound_open => {
                match pushed {
                    Some(wire) => self.apply_push(wire),
                    None => {
                        warn!("Push channel inbound stream ended");
                        self.inbound_open = false;
                    }
                }
                true
            }
            changed = self.connection.changed(), if self.connection_open => {
                if changed.is_err() {
                    self.connection_open = false;
                }
                self.publish_view();
                true
            }
            else => false,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.load_contacts();
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                more = self.process_next() => {
                    if !more {
                        break;
                    }
                }
            }
        }
        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        self.poller = None;
        self.transport.disconnect().await;
        info!("Chat session closed");
    }
}
