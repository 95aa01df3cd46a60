// REST collaborators of the chat core: contact list, conversation history, HTTP send

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{ChatError, Result};
use crate::models::{Contact, Message, MessageDraft, UserId, WireMessage};

const CONTACTS_PATH: &str = "/api/messages/contacts";
const CONVERSATION_PATH: &str = "/api/messages/conversation";
const SEND_PATH: &str = "/api/messages/send";

/// Request/response calls the chat core depends on
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Contacts of `user` in server-defined order
    async fn fetch_contacts(&self, user: UserId) -> Result<Vec<Contact>>;

    /// Chronological history between `user` and `contact`
    async fn fetch_conversation(&self, user: UserId, contact: UserId) -> Result<Vec<Message>>;

    /// Persist one message; the backend echoes the created row
    async fn send_message(&self, draft: &MessageDraft) -> Result<Message>;
}

/// `ChatApi` over the GoLance REST backend
#[derive(Clone)]
pub struct RestApi {
    client: Client,
    base_url: String,
    token: String,
}

impl RestApi {
    pub fn new(base_url: &str, token: &str) -> Self {
        RestApi {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatApi for RestApi {
    async fn fetch_contacts(&self, user: UserId) -> Result<Vec<Contact>> {
        let url = self.url(&format!("{}/{}", CONTACTS_PATH, user));
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        Self::decode(response).await
    }

    async fn fetch_conversation(&self, user: UserId, contact: UserId) -> Result<Vec<Message>> {
        let url = self.url(&format!("{}/{}/{}", CONVERSATION_PATH, user, contact));
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let wire: Vec<WireMessage> = Self::decode(response).await?;
        history_from_wire(wire)
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        let url = self.url(SEND_PATH);
        debug!("POST {} -> {}", url, draft.receiver_id);
        let response = self.authorized(self.client.post(&url)).json(draft).send().await?;
        let wire: WireMessage = Self::decode(response).await?;
        wire.into_persisted(Utc::now())
    }
}

fn history_from_wire(rows: Vec<WireMessage>) -> Result<Vec<Message>> {
    let now = Utc::now();
    rows.into_iter().map(|row| row.into_persisted(now)).collect()
}
