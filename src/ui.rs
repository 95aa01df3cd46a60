use golance_chat::chat::{ChatView, Command, Phase};
use golance_chat::models::{ConnectionState, Contact, Message, Notice, UserId};
use std::collections::HashSet;
use std::fmt::Write as _;

pub const HELP: &str = "\
Commands:
  /contacts        list contacts (* marks unread)
  /open <user id>  open the conversation with a contact
  /close           close the current conversation
  /reload          fetch the contact list again
  /help            show this help
  /quit            leave
Anything else is sent to the open conversation.";

/// A line typed by the user
#[derive(Debug, PartialEq)]
pub enum Input {
    Session(Command),
    ShowContacts,
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Input::Session(Command::Send(line.to_string())));
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    let input = match verb {
        "/contacts" => Input::ShowContacts,
        "/open" => match arg.parse::<UserId>() {
            Ok(id) => Input::Session(Command::SelectContact(id)),
            Err(_) => Input::Invalid(format!("'{}' is not a user id", arg)),
        },
        "/close" => Input::Session(Command::ClearSelection),
        "/reload" => Input::Session(Command::ReloadContacts),
        "/help" => Input::Help,
        "/quit" | "/exit" => Input::Quit,
        other => Input::Invalid(format!("Unknown command {}", other)),
    };
    Some(input)
}

fn contact_name(view: &ChatView, id: UserId) -> String {
    view.contacts
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("User {}", id))
}

fn format_contact(contact: &Contact, active: bool) -> String {
    let marker = match (active, contact.unread) {
        (true, _) => '>',
        (false, true) => '*',
        (false, false) => ' ',
    };
    match &contact.preview {
        Some(preview) => format!("{} [{}] {}: {}", marker, contact.id, contact.name, preview),
        None => format!("{} [{}] {}", marker, contact.id, contact.name),
    }
}

pub fn render_contacts(view: &ChatView) -> String {
    if view.contacts.is_empty() {
        return "No contacts yet.".to_string();
    }
    let active = match view.phase {
        Phase::Idle => None,
        Phase::Loading(id) | Phase::Ready(id) => Some(id),
    };
    let mut out = String::new();
    for contact in &view.contacts {
        let _ = writeln!(out, "{}", format_contact(contact, active == Some(contact.id)));
    }
    out
}

pub fn format_message(view: &ChatView, message: &Message) -> String {
    let who = if message.sender_id == view.me {
        "me".to_string()
    } else {
        contact_name(view, message.sender_id)
    };
    let pending = if message.id.is_local() && message.sender_id == view.me { " (sending)" } else { "" };
    format!(
        "[{}] {}: {}{}",
        message.timestamp.with_timezone(&chrono::Local).format("%H:%M"),
        who,
        message.content,
        pending
    )
}

pub fn format_notice(notice: &Notice) -> String {
    format!("! {}", notice)
}

/// Prints only what changed between snapshots
#[derive(Default)]
pub struct ConsoleView {
    phase: Option<Phase>,
    shown: Vec<Message>,
    unread: HashSet<UserId>,
    connection: Option<ConnectionState>,
}

impl ConsoleView {
    pub fn new() -> Self {
        ConsoleView::default()
    }

    pub fn update(&mut self, view: &ChatView) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connection != Some(view.connection) {
            lines.push(format!("-- push channel {} --", view.connection));
            self.connection = Some(view.connection);
        }

        for contact in view.contacts.iter().filter(|c| c.unread) {
            if self.unread.insert(contact.id) {
                let preview = contact.preview.as_deref().unwrap_or("");
                lines.push(format!("* new message from {} [{}]: {}", contact.name, contact.id, preview));
            }
        }
        self.unread.retain(|id| view.contacts.iter().any(|c| c.id == *id && c.unread));

        if self.phase != Some(view.phase) {
            match view.phase {
                Phase::Idle => lines.push("-- no conversation open --".to_string()),
                Phase::Loading(id) => lines.push(format!("-- loading conversation with {} --", contact_name(view, id))),
                Phase::Ready(id) => {
                    lines.push(format!("-- conversation with {} --", contact_name(view, id)));
                    if view.messages.is_empty() {
                        lines.push("(no messages yet)".to_string());
                    }
                }
            }
        }

        let extends_shown = self.phase == Some(view.phase) && view.messages.starts_with(&self.shown);
        let fresh = if extends_shown { &view.messages[self.shown.len()..] } else { &view.messages[..] };
        for message in fresh {
            lines.push(format_message(view, message));
        }

        self.phase = Some(view.phase);
        self.shown = view.messages.clone();
        lines
    }
}
