//! REST collaborators the session calls for reads and user actions.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use shared::{
    domain::{ChatId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{ChatSummary, MessagePayload, MessageRequest, StringResponse, UserSummary},
};
use tracing::debug;

use crate::{config::ClientSettings, identity::IdentityProvider};

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_chats(&self) -> Result<Vec<ChatSummary>>;
    async fn fetch_messages(&self, chat_id: &ChatId) -> Result<Vec<MessagePayload>>;
    async fn send_message(&self, request: &MessageRequest) -> Result<()>;
    async fn upload_media(&self, chat_id: &ChatId, upload: MediaUpload) -> Result<()>;
    async fn mark_seen(&self, chat_id: &ChatId) -> Result<()>;
    async fn create_chat(&self, sender_id: &UserId, recipient_id: &UserId) -> Result<ChatId>;
    async fn fetch_contacts(&self) -> Result<Vec<UserSummary>>;
}

pub struct HttpChatApi {
    http: Client,
    api_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpChatApi {
    pub fn new(settings: &ClientSettings, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.api_url));
        match self.identity.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (code, detail) = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => (api_error.code, api_error.message),
        Err(_) => (ErrorCode::from_status(status.as_u16()), body),
    };
    Err(anyhow!(ApiException::new(
        code,
        format!("{operation} failed with status {status}: {detail}"),
    )))
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_chats(&self) -> Result<Vec<ChatSummary>> {
        let response = self.request(Method::GET, "/chats").send().await?;
        let chats: Vec<ChatSummary> = ensure_success(response, "fetch chats")
            .await?
            .json()
            .await?;
        debug!(count = chats.len(), "fetched chats");
        Ok(chats)
    }

    async fn fetch_messages(&self, chat_id: &ChatId) -> Result<Vec<MessagePayload>> {
        let response = self
            .request(Method::GET, &format!("/messages/chat/{chat_id}"))
            .send()
            .await?;
        let messages: Vec<MessagePayload> = ensure_success(response, "fetch messages")
            .await?
            .json()
            .await?;
        debug!(chat_id = %chat_id, count = messages.len(), "fetched messages");
        Ok(messages)
    }

    async fn send_message(&self, request: &MessageRequest) -> Result<()> {
        let response = self
            .request(Method::POST, "/messages")
            .json(request)
            .send()
            .await?;
        ensure_success(response, "send message").await?;
        Ok(())
    }

    async fn upload_media(&self, chat_id: &ChatId, upload: MediaUpload) -> Result<()> {
        let mime_type = upload
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&mime_type)
            .with_context(|| format!("invalid media mime type '{mime_type}'"))?;
        let form = multipart::Form::new().part("file", part);
        let response = self
            .request(Method::POST, "/messages/upload-media")
            .query(&[("chat-id", chat_id.as_str())])
            .multipart(form)
            .send()
            .await?;
        ensure_success(response, "upload media").await?;
        Ok(())
    }

    async fn mark_seen(&self, chat_id: &ChatId) -> Result<()> {
        let response = self
            .request(Method::PATCH, "/messages")
            .query(&[("chat-id", chat_id.as_str())])
            .send()
            .await?;
        ensure_success(response, "mark seen").await?;
        Ok(())
    }

    async fn create_chat(&self, sender_id: &UserId, recipient_id: &UserId) -> Result<ChatId> {
        let response = self
            .request(Method::POST, "/chats")
            .query(&[
                ("sender-id", sender_id.as_str()),
                ("recipient-id", recipient_id.as_str()),
            ])
            .send()
            .await?;
        let body: StringResponse = ensure_success(response, "create chat")
            .await?
            .json()
            .await?;
        if body.response.is_empty() {
            return Err(anyhow!("create chat returned an empty chat id"));
        }
        Ok(ChatId(body.response))
    }

    async fn fetch_contacts(&self) -> Result<Vec<UserSummary>> {
        let response = self.request(Method::GET, "/users").send().await?;
        let users = ensure_success(response, "fetch contacts")
            .await?
            .json()
            .await?;
        Ok(users)
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
