//! Lifecycle of the single per-identity notification subscription.
//!
//! `Idle -> Connecting -> Connected -> Disconnected`, never back. A failed
//! connect or a dropped socket is final for this object; reconnecting needs a
//! fresh `NotificationConnection`.

use std::{fmt, sync::Arc, time::Duration};

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::domain::UserId;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    codec::{decode_notification, Decoded, Notification},
    config::ClientSettings,
    identity::IdentityProvider,
    stomp::{Command, Frame, Parsed, StompError},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SUBSCRIPTION_ID: &str = "sub-0";
const DISCONNECT_RECEIPT: &str = "disconnect-0";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("notification connection already started (state: {0})")]
    AlreadyStarted(ConnectionState),
    #[error("identity has no subject yet")]
    MissingSubject,
    #[error("invalid websocket url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("websocket transport failed: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("STOMP framing error: {0}")]
    Stomp(#[from] StompError),
    #[error("broker rejected the connection: {0}")]
    Rejected(String),
    #[error("socket closed before the broker acknowledged the connection")]
    ClosedDuringHandshake,
    #[error("broker did not acknowledge the connection within {0:?}")]
    HandshakeTimeout(Duration),
}

pub fn topic_for(subject: &UserId) -> String {
    format!("/user/{subject}/chat")
}

struct ActiveSubscription {
    shutdown: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

pub struct NotificationConnection {
    ws_url: String,
    queue_capacity: usize,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Option<ActiveSubscription>,
}

impl NotificationConnection {
    pub fn new(ws_url: impl Into<String>, queue_capacity: usize) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            ws_url: ws_url.into(),
            queue_capacity: queue_capacity.max(1),
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            settings.ws_url.clone(),
            settings.notification_queue_capacity,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub async fn connect(
        &mut self,
        identity: &dyn IdentityProvider,
    ) -> Result<mpsc::Receiver<Notification>, ConnectionError> {
        let current = self.state();
        if current != ConnectionState::Idle {
            return Err(ConnectionError::AlreadyStarted(current));
        }
        let subject = identity.subject().ok_or(ConnectionError::MissingSubject)?;
        let token = identity.bearer_token();

        self.state.send_replace(ConnectionState::Connecting);
        info!(ws_url = %self.ws_url, subject = %subject, "notifications: connecting");

        let (sink, source) = match self.open(&subject, token.as_deref()).await {
            Ok(halves) => halves,
            Err(err) => {
                error!(error = %err, "notifications: failed to establish subscription");
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        // Published before the reader starts so a reader that exits at once
        // always has the last word.
        self.state.send_replace(ConnectionState::Connected);
        info!(topic = %topic_for(&subject), "notifications: subscribed");

        let (events_tx, events_rx) = mpsc::channel(self.queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let reader = tokio::spawn(run_reader(sink, source, events_tx, state, shutdown_rx));
        self.active = Some(ActiveSubscription {
            shutdown: shutdown_tx,
            reader,
        });
        Ok(events_rx)
    }

    async fn open(
        &self,
        subject: &UserId,
        token: Option<&str>,
    ) -> Result<(WsSink, WsSource), ConnectionError> {
        let url = Url::parse(&self.ws_url).map_err(|err| ConnectionError::InvalidUrl {
            url: self.ws_url.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl {
                url: self.ws_url.clone(),
                reason: "scheme must be ws or wss".into(),
            });
        }
        let host = url.host_str().unwrap_or("localhost").to_string();

        let (ws_stream, _) = connect_async(self.ws_url.as_str()).await?;
        let (mut sink, mut source) = ws_stream.split();

        sink.send(Message::Text(Frame::connect(&host, token).encode()))
            .await?;
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, await_connected(&mut source)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::HandshakeTimeout(HANDSHAKE_TIMEOUT)),
        }

        sink.send(Message::Text(
            Frame::subscribe(SUBSCRIPTION_ID, &topic_for(subject)).encode(),
        ))
        .await?;
        Ok((sink, source))
    }

    pub async fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            let _ = active.shutdown.send(());
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut active.reader)
                .await
                .is_err()
            {
                warn!("notifications: reader did not stop in time; aborting");
                active.reader.abort();
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for NotificationConnection {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.reader.abort();
        }
    }
}

async fn await_connected(source: &mut WsSource) -> Result<(), ConnectionError> {
    while let Some(message) = source.next().await {
        let Some(text) = message_text(message?) else {
            continue;
        };
        let frame = match Frame::parse(&text)? {
            Parsed::Heartbeat => continue,
            Parsed::Frame(frame) => frame,
        };
        return match frame.command {
            Command::Connected => {
                debug!(
                    version = frame.header("version").unwrap_or("unknown"),
                    "notifications: broker acknowledged connection"
                );
                Ok(())
            }
            Command::Error => Err(ConnectionError::Rejected(error_detail(&frame))),
            other => Err(ConnectionError::Rejected(format!(
                "unexpected {other} frame during handshake"
            ))),
        };
    }
    Err(ConnectionError::ClosedDuringHandshake)
}

fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn error_detail(frame: &Frame) -> String {
    match frame.header("message") {
        Some(message) if !frame.body.is_empty() => format!("{message}: {}", frame.body),
        Some(message) => message.to_string(),
        None => frame.body.clone(),
    }
}

async fn run_reader(
    mut sink: WsSink,
    mut source: WsSource,
    events: mpsc::Sender<Notification>,
    state: Arc<watch::Sender<ConnectionState>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink
                    .send(Message::Text(Frame::unsubscribe(SUBSCRIPTION_ID).encode()))
                    .await;
                let _ = sink
                    .send(Message::Text(Frame::disconnect(DISCONNECT_RECEIPT).encode()))
                    .await;
                let _ = sink.close().await;
                info!("notifications: unsubscribed and closed");
                break;
            }
            next = source.next() => match next {
                Some(Ok(message)) => {
                    if let Message::Close(_) = message {
                        warn!("notifications: socket closed by server");
                        break;
                    }
                    let Some(text) = message_text(message) else {
                        continue;
                    };
                    if !dispatch_frame(&text, &events).await {
                        break;
                    }
                }
                Some(Err(err)) => {
                    error!(error = %err, "notifications: websocket receive failed");
                    break;
                }
                None => {
                    warn!("notifications: socket stream ended");
                    break;
                }
            }
        }
    }
    state.send_replace(ConnectionState::Disconnected);
}

/// Returns `false` when the subscription must stop.
async fn dispatch_frame(text: &str, events: &mpsc::Sender<Notification>) -> bool {
    let frame = match Frame::parse(text) {
        Ok(Parsed::Heartbeat) => return true,
        Ok(Parsed::Frame(frame)) => frame,
        Err(err) => {
            warn!(error = %err, "notifications: dropping malformed STOMP frame");
            return true;
        }
    };

    match frame.command {
        Command::Message => match decode_notification(&frame.body) {
            Ok(Decoded::Notification(notification)) => {
                if events.send(notification).await.is_err() {
                    debug!("notifications: consumer gone; stopping reader");
                    return false;
                }
                true
            }
            Ok(Decoded::Unsupported { kind }) => {
                debug!(kind = %kind, "notifications: ignoring unsupported notification type");
                true
            }
            Err(err) => {
                warn!(error = %err, "notifications: dropping malformed notification");
                true
            }
        },
        Command::Error => {
            error!(detail = %error_detail(&frame), "notifications: broker sent ERROR frame");
            false
        }
        other => {
            debug!(command = %other, "notifications: ignoring frame");
            true
        }
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
