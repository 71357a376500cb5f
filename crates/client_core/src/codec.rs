//! Turns pushed notification bodies into typed events.

use shared::{
    domain::{ChatId, MessageKind, NotificationType, UserId},
    protocol::NotificationFrame,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Message {
        chat_id: ChatId,
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        message_kind: MessageKind,
        chat_name: Option<String>,
    },
    Image {
        chat_id: ChatId,
        sender_id: UserId,
        receiver_id: UserId,
        content: Option<String>,
        media: Vec<String>,
        chat_name: Option<String>,
    },
    Seen {
        chat_id: ChatId,
        sender_id: Option<UserId>,
        receiver_id: Option<UserId>,
    },
}

impl Notification {
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Notification::Message { chat_id, .. }
            | Notification::Image { chat_id, .. }
            | Notification::Seen { chat_id, .. } => chat_id,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Notification::Message { .. } => "message",
            Notification::Image { .. } => "image",
            Notification::Seen { .. } => "seen",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Notification(Notification),
    /// Well-formed frame of a type this client does not reconcile.
    Unsupported { kind: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("notification body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("notification is missing its type")]
    MissingType,
    #[error("notification is missing its chat id")]
    MissingChatId,
    #[error("{kind} notification for chat {chat_id} is missing {field}")]
    MissingField {
        kind: &'static str,
        chat_id: String,
        field: &'static str,
    },
}

pub fn decode_notification(text: &str) -> Result<Decoded, DecodeError> {
    let frame: NotificationFrame = serde_json::from_str(text)?;
    validate_frame(frame)
}

pub fn validate_frame(frame: NotificationFrame) -> Result<Decoded, DecodeError> {
    let kind = match frame.kind.ok_or(DecodeError::MissingType)? {
        NotificationType::Message => HandledKind::Message,
        NotificationType::Image => HandledKind::Image,
        NotificationType::Seen => HandledKind::Seen,
        NotificationType::Audio => return Ok(unsupported("AUDIO")),
        NotificationType::Video => return Ok(unsupported("VIDEO")),
        NotificationType::Other => return Ok(unsupported("unknown")),
    };

    let chat_id = frame
        .chat_id
        .filter(|id| !id.as_str().is_empty())
        .ok_or(DecodeError::MissingChatId)?;

    let notification = match kind {
        HandledKind::Seen => Notification::Seen {
            chat_id,
            sender_id: frame.sender_id,
            receiver_id: frame.receiver_id,
        },
        HandledKind::Message => {
            let (sender_id, receiver_id) =
                require_route("message", &chat_id, frame.sender_id, frame.receiver_id)?;
            Notification::Message {
                chat_id,
                sender_id,
                receiver_id,
                content: frame.content.unwrap_or_default(),
                message_kind: frame.message_type.unwrap_or(MessageKind::Text),
                chat_name: frame.chat_name,
            }
        }
        HandledKind::Image => {
            let (sender_id, receiver_id) =
                require_route("image", &chat_id, frame.sender_id, frame.receiver_id)?;
            Notification::Image {
                chat_id,
                sender_id,
                receiver_id,
                content: frame.content,
                media: frame.media,
                chat_name: frame.chat_name,
            }
        }
    };
    Ok(Decoded::Notification(notification))
}

enum HandledKind {
    Message,
    Image,
    Seen,
}

fn unsupported(kind: &str) -> Decoded {
    Decoded::Unsupported {
        kind: kind.to_string(),
    }
}

fn require_route(
    kind: &'static str,
    chat_id: &ChatId,
    sender_id: Option<UserId>,
    receiver_id: Option<UserId>,
) -> Result<(UserId, UserId), DecodeError> {
    let missing = |field| DecodeError::MissingField {
        kind,
        chat_id: chat_id.to_string(),
        field,
    };
    let sender_id = sender_id.ok_or_else(|| missing("senderId"))?;
    let receiver_id = receiver_id.ok_or_else(|| missing("receiverId"))?;
    Ok((sender_id, receiver_id))
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
