//! Applies one pushed notification to the chat list and the open thread.
//!
//! Decision order:
//! 1. notification for the open chat: MESSAGE/IMAGE append to the thread and
//!    refresh that chat's preview; SEEN marks the whole thread seen.
//! 2. MESSAGE/IMAGE for a known background chat: refresh preview and
//!    timestamp, bump unread, keep list position.
//! 3. MESSAGE for an unknown chat: materialize it at the front with unread 1.
//! 4. everything else (SEEN for a background chat, IMAGE for an unknown chat)
//!    is ignored.

use chrono::NaiveDateTime;
use shared::{
    domain::{ChatId, MessageKind, MessageState},
    protocol::{ChatSummary, MessagePayload, ATTACHMENT_PREVIEW},
};

use crate::{
    codec::Notification,
    store::{ChatStore, MessageStore},
};

/// Which branch a notification took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    AppendedToOpenChat {
        chat_id: ChatId,
        message: MessagePayload,
    },
    MarkedSeen { chat_id: ChatId, updated: usize },
    UpdatedBackgroundChat { chat_id: ChatId, unread_count: u64 },
    MaterializedChat { chat_id: ChatId },
    Ignored { chat_id: ChatId, reason: IgnoreReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    SeenForBackgroundChat,
    ImageForUnknownChat,
}

impl Reconciled {
    pub fn chat_list_changed(&self) -> bool {
        matches!(
            self,
            Reconciled::AppendedToOpenChat { .. }
                | Reconciled::UpdatedBackgroundChat { .. }
                | Reconciled::MaterializedChat { .. }
        )
    }

    pub fn thread_changed(&self) -> bool {
        match self {
            Reconciled::AppendedToOpenChat { .. } => true,
            Reconciled::MarkedSeen { updated, .. } => *updated > 0,
            _ => false,
        }
    }
}

pub fn reconcile(
    notification: Notification,
    selected_chat_id: Option<&ChatId>,
    messages: &mut MessageStore,
    chats: &mut ChatStore,
    now: NaiveDateTime,
) -> Reconciled {
    let is_open = selected_chat_id == Some(notification.chat_id());
    if is_open {
        apply_to_open_chat(notification, messages, chats, now)
    } else {
        apply_to_background_chat(notification, chats, now)
    }
}

fn apply_to_open_chat(
    notification: Notification,
    messages: &mut MessageStore,
    chats: &mut ChatStore,
    now: NaiveDateTime,
) -> Reconciled {
    match notification {
        Notification::Seen { chat_id, .. } => {
            let updated = messages.mark_all_seen();
            Reconciled::MarkedSeen { chat_id, updated }
        }
        Notification::Message {
            chat_id,
            sender_id,
            receiver_id,
            content,
            message_kind,
            ..
        } => {
            chats.upsert_preview(&chat_id, content.clone(), None);
            let message = MessagePayload {
                id: None,
                sender_id,
                recipient_id: receiver_id,
                content: Some(content),
                kind: message_kind,
                state: MessageState::Sent,
                created_at: Some(now),
                media: Vec::new(),
            };
            messages.append_message(message.clone());
            Reconciled::AppendedToOpenChat { chat_id, message }
        }
        Notification::Image {
            chat_id,
            sender_id,
            receiver_id,
            content,
            media,
            ..
        } => {
            chats.upsert_preview(&chat_id, ATTACHMENT_PREVIEW, None);
            let message = MessagePayload {
                id: None,
                sender_id,
                recipient_id: receiver_id,
                content,
                kind: MessageKind::Image,
                state: MessageState::Sent,
                created_at: Some(now),
                media,
            };
            messages.append_message(message.clone());
            Reconciled::AppendedToOpenChat { chat_id, message }
        }
    }
}

fn apply_to_background_chat(
    notification: Notification,
    chats: &mut ChatStore,
    now: NaiveDateTime,
) -> Reconciled {
    let (chat_id, preview) = match &notification {
        Notification::Seen { chat_id, .. } => {
            return Reconciled::Ignored {
                chat_id: chat_id.clone(),
                reason: IgnoreReason::SeenForBackgroundChat,
            }
        }
        Notification::Message {
            chat_id, content, ..
        } => (chat_id, content.clone()),
        Notification::Image { chat_id, .. } => (chat_id, ATTACHMENT_PREVIEW.to_string()),
    };

    if chats.upsert_preview(chat_id, preview, Some(now)) {
        let unread_count = chats.increment_unread(chat_id).unwrap_or_default();
        return Reconciled::UpdatedBackgroundChat {
            chat_id: chat_id.clone(),
            unread_count,
        };
    }

    match notification {
        Notification::Message {
            chat_id,
            sender_id,
            receiver_id,
            content,
            chat_name,
            ..
        } => {
            chats.insert_front(ChatSummary {
                id: chat_id.clone(),
                name: chat_name.unwrap_or_default(),
                sender_id,
                recipient_id: receiver_id,
                last_message: Some(content),
                last_message_time: Some(now),
                unread_count: 1,
                recipient_online: false,
            });
            Reconciled::MaterializedChat { chat_id }
        }
        other => Reconciled::Ignored {
            chat_id: other.chat_id().clone(),
            reason: IgnoreReason::ImageForUnknownChat,
        },
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
