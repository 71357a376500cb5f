use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{ChatId, MessageKind, MessageState, NotificationType, UserId};

/// Preview text shown for any non-text last message.
pub const ATTACHMENT_PREVIEW: &str = "Attachment";

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    #[serde(default)]
    pub name: String,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default, alias = "isRecipientOnline")]
    pub recipient_online: bool,
}

impl ChatSummary {
    /// The participant that is not `me`.
    pub fn counterpart(&self, me: &UserId) -> &UserId {
        if &self.sender_id == me {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    /// `(sender, recipient)` for a message authored by `me` in this chat.
    pub fn outbound_route(&self, me: &UserId) -> (UserId, UserId) {
        (me.clone(), self.counterpart(me).clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub state: MessageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(
        default,
        deserialize_with = "deserialize_media",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub media: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringResponse {
    pub response: String,
}

/// Registered user as listed by the contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<NaiveDateTime>,
    #[serde(default, alias = "isOnline")]
    pub online: bool,
}

impl UserSummary {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Raw notification body as pushed on the per-user topic.
///
/// Every field is optional here; validation into a typed event happens on the
/// client side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFrame {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(
        default,
        alias = "recipientId",
        skip_serializing_if = "Option::is_none"
    )]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageKind>,
    #[serde(
        default,
        deserialize_with = "deserialize_media",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MediaField {
    One(String),
    Many(Vec<String>),
}

/// Media arrives either as one base64 string (a serialized byte array) or as
/// a list of encoded blobs.
fn deserialize_media<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let field = Option::<MediaField>::deserialize(deserializer)?;
    Ok(match field {
        None => Vec::new(),
        Some(MediaField::One(blob)) if blob.is_empty() => Vec::new(),
        Some(MediaField::One(blob)) => vec![blob],
        Some(MediaField::Many(blobs)) => blobs,
    })
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
