//! In-memory chat list and open-thread message list.

use chrono::NaiveDateTime;
use shared::{
    domain::{ChatId, MessageState},
    protocol::{ChatSummary, MessagePayload},
};

const PREVIEW_MAX_CHARS: usize = 20;
const PREVIEW_KEEP_CHARS: usize = 17;
const PREVIEW_ELLIPSIS: &str = "...";

// Over 20 chars: first 17 plus "...".
pub fn wrap_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut wrapped: String = text.chars().take(PREVIEW_KEEP_CHARS).collect();
    wrapped.push_str(PREVIEW_ELLIPSIS);
    wrapped
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatStore {
    chats: Vec<ChatSummary>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, chats: Vec<ChatSummary>) {
        self.chats = chats;
    }

    pub fn find(&self, chat_id: &ChatId) -> Option<&ChatSummary> {
        self.chats.iter().find(|chat| &chat.id == chat_id)
    }

    pub fn find_mut(&mut self, chat_id: &ChatId) -> Option<&mut ChatSummary> {
        self.chats.iter_mut().find(|chat| &chat.id == chat_id)
    }

    pub fn position(&self, chat_id: &ChatId) -> Option<usize> {
        self.chats.iter().position(|chat| &chat.id == chat_id)
    }

    pub fn contains(&self, chat_id: &ChatId) -> bool {
        self.position(chat_id).is_some()
    }

    pub fn upsert_preview(
        &mut self,
        chat_id: &ChatId,
        text: impl Into<String>,
        timestamp: Option<NaiveDateTime>,
    ) -> bool {
        let Some(chat) = self.find_mut(chat_id) else {
            return false;
        };
        chat.last_message = Some(text.into());
        if let Some(timestamp) = timestamp {
            chat.last_message_time = Some(timestamp);
        }
        true
    }

    pub fn increment_unread(&mut self, chat_id: &ChatId) -> Option<u64> {
        let chat = self.find_mut(chat_id)?;
        chat.unread_count = chat.unread_count.saturating_add(1);
        Some(chat.unread_count)
    }

    pub fn reset_unread(&mut self, chat_id: &ChatId) -> bool {
        match self.find_mut(chat_id) {
            Some(chat) => {
                chat.unread_count = 0;
                true
            }
            None => false,
        }
    }

    pub fn insert_front(&mut self, chat: ChatSummary) {
        if let Some(existing) = self.position(&chat.id) {
            self.chats.remove(existing);
        }
        self.chats.insert(0, chat);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatSummary> {
        self.chats.iter()
    }

    pub fn as_slice(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStore {
    messages: Vec<MessagePayload>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, messages: Vec<MessagePayload>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn append_message(&mut self, message: MessagePayload) {
        self.messages.push(message);
    }

    pub fn mark_all_seen(&mut self) -> usize {
        let mut updated = 0;
        for message in &mut self.messages {
            if message.state != MessageState::Seen {
                message.state = MessageState::Seen;
                updated += 1;
            }
        }
        updated
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessagePayload> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[MessagePayload] {
        &self.messages
    }

    pub fn last(&self) -> Option<&MessagePayload> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
