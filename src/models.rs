use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Opaque backend user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: UserId,
    #[serde(alias = "username")]
    pub name: String,
    #[serde(default, alias = "lastMessage")]
    pub preview: Option<String>,
    #[serde(skip)]
    pub unread: bool,
}

impl Contact {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Contact {
            id,
            name: name.into(),
            preview: None,
            unread: false,
        }
    }

    /// Stand-in for a user we only know by id
    pub fn placeholder(id: UserId) -> Self {
        Contact::new(id, format!("User {}", id))
    }
}

/// Identity of a message in the visible sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Assigned by the backend once persisted
    Server(i64),
    /// Assigned locally from the wall clock (optimistic sends, id-less pushes)
    Local(i64),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// The party of this message that is not `me`
    pub fn counterpart(&self, me: UserId) -> Option<UserId> {
        if self.sender_id == me {
            Some(self.receiver_id)
        } else if self.receiver_id == me {
            Some(self.sender_id)
        } else {
            None
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// Outbound message before the backend has seen it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

/// Message as it travels over HTTP and STOMP.
/// Push payloads usually carry no `id`; some backends omit the timestamp too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default, with = "timestamp_format", alias = "createdAt")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Convert to a visible message, using `local_id` and `now` for missing fields
    pub fn into_message(self, local_id: impl FnOnce() -> i64, now: DateTime<Utc>) -> Message {
        let id = match self.id {
            Some(id) => MessageId::Server(id),
            None => MessageId::Local(local_id()),
        };
        Message {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }

    /// Rows the backend has stored must carry their server id
    pub fn into_persisted(self, now: DateTime<Utc>) -> Result<Message, ChatError> {
        let id = self.id.ok_or(ChatError::MissingId)?;
        Ok(self.into_message(|| id, now))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "offline",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "live",
        };
        f.write_str(label)
    }
}

/// One-time failure shown to the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    SendFailed { content: String, reason: String },
    ContactsLoadFailed(String),
    ConversationLoadFailed { contact: UserId, reason: String },
    PublishFailed(String),
    NoActiveContact,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SendFailed { content, reason } => {
                write!(f, "Failed to send \"{}\": {}", content, reason)
            }
            Notice::ContactsLoadFailed(reason) => write!(f, "Could not load contacts: {}", reason),
            Notice::ConversationLoadFailed { contact, reason } => {
                write!(f, "Could not load conversation with {}: {}", contact, reason)
            }
            Notice::PublishFailed(reason) => write!(f, "Failed to publish message: {}", reason),
            Notice::NoActiveContact => f.write_str("Select a contact before sending"),
        }
    }
}

/// Backend timestamps: RFC 3339, zone-less ISO-8601 (read as UTC) or epoch millis
mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(Raw::Millis(ms)) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", ms))),
            Some(Raw::Text(text)) => parse_text(&text).map(Some).map_err(de::Error::custom),
        }
    }

    fn parse_text(text: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("unrecognised timestamp '{}': {}", text, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn contact_accepts_backend_field_names() {
        let json = r#"{"id": 7, "username": "ana", "lastMessage": "see you"}"#;
        let contact: Contact = serde_json::from_str(json).unwrap();

        assert_eq!(contact.id, UserId(7));
        assert_eq!(contact.name, "ana");
        assert_eq!(contact.preview.as_deref(), Some("see you"));
        assert!(!contact.unread);
    }

    #[test]
    fn push_payload_without_id_gets_local_identity() {
        let json = r#"{"senderId": 2, "receiverId": 1, "content": "hi", "timestamp": "2024-03-01T10:15:30"}"#;
        let wire: WireMessage = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let msg = wire.into_message(|| 42, now);

        assert_eq!(msg.id, MessageId::Local(42));
        assert_eq!(msg.sender_id, UserId(2));
        assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap());
    }

    #[test]
    fn persisted_rows_keep_server_identity() {
        let json = r#"{"id": 31, "senderId": 1, "receiverId": 2, "content": "stored"}"#;
        let wire: WireMessage = serde_json::from_str(json).unwrap();
        let msg = wire.into_persisted(Utc::now()).unwrap();
        assert_eq!(msg.id, MessageId::Server(31));
        assert!(!msg.id.is_local());

        let json = r#"{"senderId": 1, "receiverId": 2, "content": "no id"}"#;
        let wire: WireMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(wire.into_persisted(Utc::now()), Err(ChatError::MissingId)));
    }

    #[test]
    fn timestamp_formats() {
        let millis: WireMessage = serde_json::from_str(
            r#"{"id": 5, "senderId": 1, "receiverId": 2, "content": "x", "timestamp": 1700000000000}"#,
        )
        .unwrap();
        assert_eq!(millis.timestamp, Utc.timestamp_millis_opt(1_700_000_000_000).single());

        let zoned: WireMessage = serde_json::from_str(
            r#"{"id": 5, "senderId": 1, "receiverId": 2, "content": "x", "createdAt": "2024-03-01T10:15:30+02:00"}"#,
        )
        .unwrap();
        assert_eq!(zoned.timestamp, Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 30).unwrap()));

        let missing: WireMessage =
            serde_json::from_str(r#"{"senderId": 1, "receiverId": 2, "content": "x"}"#).unwrap();
        assert_eq!(missing.timestamp, None);

        let bad = serde_json::from_str::<WireMessage>(
            r#"{"senderId": 1, "receiverId": 2, "content": "x", "timestamp": "yesterday"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn draft_serializes_camel_case() {
        let draft = MessageDraft {
            sender_id: UserId(1),
            receiver_id: UserId(2),
            content: "test".to_string(),
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value, serde_json::json!({"senderId": 1, "receiverId": 2, "content": "test"}));
    }

    #[test]
    fn counterpart_is_the_other_party() {
        let msg = Message {
            id: MessageId::Server(1),
            sender_id: UserId(1),
            receiver_id: UserId(2),
            content: "hello".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(msg.counterpart(UserId(1)), Some(UserId(2)));
        assert_eq!(msg.counterpart(UserId(2)), Some(UserId(1)));
        assert_eq!(msg.counterpart(UserId(3)), None);
    }
}
