use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDateTime, Utc};
use shared::{
    domain::{ChatId, MessageKind, MessageState, UserId},
    protocol::{ChatSummary, MessagePayload, MessageRequest, UserSummary, ATTACHMENT_PREVIEW},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::{ChatApi, MediaUpload},
    codec::Notification,
    config::ClientSettings,
    connection::{ConnectionError, ConnectionState, NotificationConnection},
    identity::IdentityProvider,
    reconcile::{reconcile, Reconciled},
    store::{ChatStore, MessageStore},
};

const EVENT_CAPACITY: usize = 1024;
const PUMP_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    ChatsUpdated,
    ThreadUpdated { chat_id: ChatId },
    Reconciled(Reconciled),
    ConnectionStateChanged(ConnectionState),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub chats: Vec<ChatSummary>,
    pub messages: Vec<MessagePayload>,
    pub selected_chat_id: Option<ChatId>,
}

impl SessionSnapshot {
    pub fn selected_chat(&self) -> Option<&ChatSummary> {
        let selected = self.selected_chat_id.as_ref()?;
        self.chats.iter().find(|chat| &chat.id == selected)
    }
}

#[derive(Default)]
struct SessionState {
    chats: ChatStore,
    messages: MessageStore,
    selected: Option<ChatId>,
    // Bumped on every selection; completions carrying an older value are stale.
    generation: u64,
    loading: Option<ThreadLoad>,
}

// Messages already in the store while this is set were pushed after selection.
struct ThreadLoad {
    generation: u64,
    seen_pushed: bool,
}

impl SessionState {
    fn is_current(&self, chat_id: &ChatId, generation: u64) -> bool {
        self.generation == generation && self.selected.as_ref() == Some(chat_id)
    }
}

struct OpenChat {
    chat_id: ChatId,
    sender_id: UserId,
    recipient_id: UserId,
    generation: u64,
}

pub struct ChatSession {
    identity: Arc<dyn IdentityProvider>,
    api: Arc<dyn ChatApi>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatSession {
    pub fn new(identity: Arc<dyn IdentityProvider>, api: Arc<dyn ChatApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            identity,
            api,
            inner: Mutex::new(SessionState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock().await;
        SessionSnapshot {
            chats: state.chats.as_slice().to_vec(),
            messages: state.messages.as_slice().to_vec(),
            selected_chat_id: state.selected.clone(),
        }
    }

    pub async fn load_chats(&self) -> Result<usize> {
        let chats = self
            .api
            .fetch_chats()
            .await
            .map_err(|err| self.surface("fetch chats", err))?;
        let count = chats.len();
        self.inner.lock().await.chats.replace_all(chats);
        info!(count, "chat list loaded");
        self.emit(ClientEvent::ChatsUpdated);
        Ok(count)
    }

    pub async fn select_chat(&self, chat_id: &ChatId) -> Result<()> {
        let generation = {
            let mut state = self.inner.lock().await;
            if !state.chats.contains(chat_id) {
                return Err(anyhow!("chat {chat_id} is not in the chat list"));
            }
            state.selected = Some(chat_id.clone());
            state.chats.reset_unread(chat_id);
            state.messages.clear();
            state.generation += 1;
            state.loading = Some(ThreadLoad {
                generation: state.generation,
                seen_pushed: false,
            });
            state.generation
        };
        self.emit(ClientEvent::ChatsUpdated);
        self.emit(ClientEvent::ThreadUpdated {
            chat_id: chat_id.clone(),
        });

        let fetched = self.api.fetch_messages(chat_id).await;
        {
            let mut state = self.inner.lock().await;
            if !state.is_current(chat_id, generation) {
                debug!(chat_id = %chat_id, "discarding thread for a chat that is no longer open");
                return fetched
                    .map(|_| ())
                    .map_err(|err| self.surface("fetch messages", err));
            }
            let load = state.loading.take();
            let mut history = fetched.map_err(|err| self.surface("fetch messages", err))?;
            if load.is_some_and(|load| load.seen_pushed) {
                history
                    .iter_mut()
                    .for_each(|message| message.state = MessageState::Seen);
            }
            let pushed = state.messages.as_slice().to_vec();
            if !pushed.is_empty() {
                debug!(
                    chat_id = %chat_id,
                    pushed = pushed.len(),
                    "keeping messages pushed while the thread loaded"
                );
            }
            history.extend(pushed);
            state.messages.replace_all(history);
        }
        self.emit(ClientEvent::ThreadUpdated {
            chat_id: chat_id.clone(),
        });

        if let Err(err) = self.api.mark_seen(chat_id).await {
            warn!(chat_id = %chat_id, error = %err, "failed to mark chat seen");
        }
        Ok(())
    }

    /// Local message states only change when the peer's SEEN comes back.
    pub async fn mark_seen(&self) -> Result<()> {
        let Some(chat_id) = self.inner.lock().await.selected.clone() else {
            return Ok(());
        };
        self.api
            .mark_seen(&chat_id)
            .await
            .map_err(|err| self.surface("mark seen", err))
    }

    pub async fn send_text(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(anyhow!("message content is empty"));
        }
        let open = self.open_chat().await?;
        let request = MessageRequest {
            chat_id: open.chat_id.clone(),
            sender_id: open.sender_id.clone(),
            recipient_id: open.recipient_id.clone(),
            content: content.to_string(),
            kind: MessageKind::Text,
        };
        self.api
            .send_message(&request)
            .await
            .map_err(|err| self.surface("send message", err))?;

        let appended = {
            let mut state = self.inner.lock().await;
            state
                .chats
                .upsert_preview(&open.chat_id, content.to_string(), None);
            let current = state.is_current(&open.chat_id, open.generation);
            if current {
                state.messages.append_message(MessagePayload {
                    id: None,
                    sender_id: open.sender_id,
                    recipient_id: open.recipient_id,
                    content: Some(request.content),
                    kind: MessageKind::Text,
                    state: MessageState::Sent,
                    created_at: Some(now()),
                    media: Vec::new(),
                });
            }
            current
        };
        self.emit(ClientEvent::ChatsUpdated);
        if appended {
            self.emit(ClientEvent::ThreadUpdated {
                chat_id: open.chat_id,
            });
        } else {
            debug!(chat_id = %open.chat_id, "send completed after chat switch; thread left as is");
        }
        Ok(())
    }

    pub async fn upload_media(
        &self,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(anyhow!("attachment '{file_name}' is empty"));
        }
        let open = self.open_chat().await?;
        let encoded = STANDARD.encode(&bytes);
        let upload = MediaUpload {
            file_name: file_name.to_string(),
            mime_type: mime_type.map(str::to_string),
            bytes,
        };
        self.api
            .upload_media(&open.chat_id, upload)
            .await
            .map_err(|err| self.surface("upload media", err))?;

        {
            let mut state = self.inner.lock().await;
            if !state.is_current(&open.chat_id, open.generation) {
                debug!(chat_id = %open.chat_id, "upload completed after chat switch; thread left as is");
                return Ok(());
            }
            state.messages.append_message(MessagePayload {
                id: None,
                sender_id: open.sender_id,
                recipient_id: open.recipient_id,
                content: Some(ATTACHMENT_PREVIEW.to_string()),
                kind: MessageKind::Image,
                state: MessageState::Sent,
                created_at: Some(now()),
                media: vec![encoded],
            });
        }
        self.emit(ClientEvent::ThreadUpdated {
            chat_id: open.chat_id,
        });
        Ok(())
    }

    pub async fn fetch_contacts(&self) -> Result<Vec<UserSummary>> {
        self.api
            .fetch_contacts()
            .await
            .map_err(|err| self.surface("fetch contacts", err))
    }

    pub async fn create_chat(&self, contact: &UserSummary) -> Result<ChatId> {
        let me = self.subject()?;
        if contact.id == me {
            return Err(anyhow!("cannot start a chat with yourself"));
        }
        let chat_id = self
            .api
            .create_chat(&me, &contact.id)
            .await
            .map_err(|err| self.surface("create chat", err))?;

        self.inner.lock().await.chats.insert_front(ChatSummary {
            id: chat_id.clone(),
            name: contact.display_name(),
            sender_id: me,
            recipient_id: contact.id.clone(),
            last_message: None,
            last_message_time: contact.last_seen,
            unread_count: 0,
            recipient_online: contact.online,
        });
        info!(chat_id = %chat_id, contact = %contact.id, "chat created");
        self.emit(ClientEvent::ChatsUpdated);

        self.select_chat(&chat_id).await?;
        Ok(chat_id)
    }

    pub async fn apply_notification(&self, notification: Notification) -> Reconciled {
        let chat_id = notification.chat_id().clone();
        let kind = notification.kind_label();
        let outcome = {
            let mut guard = self.inner.lock().await;
            let SessionState {
                chats,
                messages,
                selected,
                generation,
                loading,
            } = &mut *guard;
            let outcome = reconcile(notification, selected.as_ref(), messages, chats, now());
            if let (Reconciled::MarkedSeen { .. }, Some(load)) = (&outcome, loading.as_mut()) {
                if load.generation == *generation {
                    load.seen_pushed = true;
                }
            }
            outcome
        };
        debug!(chat_id = %chat_id, kind, outcome = ?outcome, "notification applied");

        if outcome.chat_list_changed() {
            self.emit(ClientEvent::ChatsUpdated);
        }
        if outcome.thread_changed() {
            self.emit(ClientEvent::ThreadUpdated { chat_id });
        }
        self.emit(ClientEvent::Reconciled(outcome.clone()));
        outcome
    }

    pub fn spawn_notification_pump(
        self: &Arc<Self>,
        mut notifications: mpsc::Receiver<Notification>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                session.apply_notification(notification).await;
            }
            debug!("notification pump finished");
        })
    }

    fn subject(&self) -> Result<UserId> {
        self.identity
            .subject()
            .ok_or_else(|| anyhow!("no authenticated user"))
    }

    async fn open_chat(&self) -> Result<OpenChat> {
        let me = self.subject()?;
        let state = self.inner.lock().await;
        let chat_id = state
            .selected
            .clone()
            .ok_or_else(|| anyhow!("no chat is open"))?;
        let chat = state
            .chats
            .find(&chat_id)
            .ok_or_else(|| anyhow!("open chat {chat_id} is missing from the chat list"))?;
        let (sender_id, recipient_id) = chat.outbound_route(&me);
        Ok(OpenChat {
            chat_id,
            sender_id,
            recipient_id,
            generation: state.generation,
        })
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn surface(&self, operation: &'static str, err: anyhow::Error) -> anyhow::Error {
        warn!(operation, error = %err, "chat operation failed");
        self.emit(ClientEvent::Error(format!("{operation} failed: {err}")));
        err.context(format!("{operation} failed"))
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub struct ChatClient {
    session: Arc<ChatSession>,
    identity: Arc<dyn IdentityProvider>,
    connection: NotificationConnection,
    pump: Option<JoinHandle<()>>,
    state_forwarder: JoinHandle<()>,
}

impl ChatClient {
    pub async fn mount(
        settings: &ClientSettings,
        identity: Arc<dyn IdentityProvider>,
        api: Arc<dyn ChatApi>,
    ) -> Result<Self> {
        settings.validate()?;
        let session = ChatSession::new(Arc::clone(&identity), api);
        let connection = NotificationConnection::from_settings(settings);
        let state_forwarder = forward_connection_state(&connection, session.events.clone());

        let mut client = Self {
            session,
            identity,
            connection,
            pump: None,
            state_forwarder,
        };

        if let Err(err) = client.session.load_chats().await {
            warn!(error = %err, "initial chat list load failed");
        }
        if client.identity.subject().is_some() {
            if let Err(err) = client.connect_notifications().await {
                client
                    .session
                    .emit(ClientEvent::Error(format!("notifications unavailable: {err}")));
            }
        } else {
            info!("identity has no subject yet; notifications stay idle");
        }
        Ok(client)
    }

    pub async fn connect_notifications(&mut self) -> Result<(), ConnectionError> {
        let notifications = self.connection.connect(self.identity.as_ref()).await?;
        self.pump = Some(self.session.spawn_notification_pump(notifications));
        Ok(())
    }

    pub fn session(&self) -> &Arc<ChatSession> {
        &self.session
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.session.subscribe_events()
    }

    pub async fn unmount(mut self) {
        self.connection.teardown().await;
        if let Some(mut pump) = self.pump.take() {
            if tokio::time::timeout(PUMP_DRAIN_GRACE, &mut pump)
                .await
                .is_err()
            {
                warn!("notification pump did not drain in time; aborting");
                pump.abort();
            }
        }
        self.state_forwarder.abort();
        info!("chat client unmounted");
    }
}

fn forward_connection_state(
    connection: &NotificationConnection,
    events: broadcast::Sender<ClientEvent>,
) -> JoinHandle<()> {
    let mut state = connection.watch_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            let _ = events.send(ClientEvent::ConnectionStateChanged(current));
        }
    })
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
