use super::*;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use shared::domain::ChatId;
use tokio::net::TcpListener;

use crate::identity::StaticIdentity;

const WAIT: Duration = Duration::from_secs(5);

struct Script {
    connect_reply: String,
    accept: bool,
    pushes: Vec<String>,
    close_after_pushes: bool,
    seen: mpsc::UnboundedSender<String>,
}

async fn stomp_endpoint(ws: WebSocketUpgrade, State(script): State<Arc<Script>>) -> Response {
    ws.on_upgrade(move |socket| run_script(socket, script))
}

async fn run_script(mut socket: WebSocket, script: Arc<Script>) {
    let Some(Ok(WsMessage::Text(connect))) = socket.recv().await else {
        return;
    };
    let _ = script.seen.send(connect);
    if socket
        .send(WsMessage::Text(script.connect_reply.clone()))
        .await
        .is_err()
        || !script.accept
    {
        return;
    }

    let Some(Ok(WsMessage::Text(subscribe))) = socket.recv().await else {
        return;
    };
    let _ = script.seen.send(subscribe);

    for push in &script.pushes {
        if socket.send(WsMessage::Text(push.clone())).await.is_err() {
            return;
        }
    }
    if script.close_after_pushes {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            let _ = script.seen.send(text);
        }
    }
}

async fn spawn_stomp_server(
    connect_reply: String,
    accept: bool,
    pushes: Vec<String>,
    close_after_pushes: bool,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (seen, seen_rx) = mpsc::unbounded_channel();
    let script = Arc::new(Script {
        connect_reply,
        accept,
        pushes,
        close_after_pushes,
        seen,
    });
    let app = Router::new()
        .route("/ws/websocket", get(stomp_endpoint))
        .with_state(script);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("ws://{addr}/ws/websocket"), seen_rx)
}

fn connected() -> String {
    Frame::new(Command::Connected)
        .with_header("version", "1.2")
        .encode()
}

fn push(body: &str) -> String {
    Frame::new(Command::Message)
        .with_header("destination", "/user/me/chat")
        .with_header("subscription", SUBSCRIPTION_ID)
        .with_body(body)
        .encode()
}

async fn next_seen(seen: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(WAIT, seen.recv())
        .await
        .expect("server frame in time")
        .expect("server frame")
}

#[tokio::test]
async fn subscribes_to_private_topic_and_delivers_in_order() {
    let pushes = vec![
        push(r#"{"chatId":"c1","senderId":"dana","receiverId":"me","content":"hi","type":"MESSAGE"}"#),
        push("definitely not json"),
        push(r#"{"chatId":"c1","type":"AUDIO"}"#),
        push(r#"{"chatId":"c1","type":"SEEN"}"#),
    ];
    let (url, mut seen) = spawn_stomp_server(connected(), true, pushes, false).await;
    let mut connection = NotificationConnection::new(url, 8);
    let identity = StaticIdentity::new("me", "token-123");

    let mut events = connection.connect(&identity).await.expect("connect");
    assert_eq!(connection.state(), ConnectionState::Connected);

    let connect = next_seen(&mut seen).await;
    assert!(connect.starts_with("CONNECT\n"));
    assert!(connect.contains("Authorization:Bearer token-123\n"));
    let subscribe = next_seen(&mut seen).await;
    assert!(subscribe.contains("destination:/user/me/chat\n"));

    let first = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("first in time")
        .expect("first");
    assert!(matches!(first, Notification::Message { ref content, .. } if content == "hi"));
    let second = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("second in time")
        .expect("second");
    assert_eq!(second.chat_id(), &ChatId::from("c1"));
    assert!(matches!(second, Notification::Seen { .. }));

    connection.teardown().await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(next_seen(&mut seen).await.starts_with("UNSUBSCRIBE\n"));
    assert!(next_seen(&mut seen).await.starts_with("DISCONNECT\n"));
}

#[tokio::test]
async fn connect_requires_subject() {
    let mut connection = NotificationConnection::new("ws://127.0.0.1:9/ws/websocket", 4);

    let err = connection
        .connect(&StaticIdentity::anonymous())
        .await
        .expect_err("no subject");

    assert!(matches!(err, ConnectionError::MissingSubject));
    assert_eq!(connection.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn rejected_handshake_is_terminal() {
    let error = Frame::new(Command::Error)
        .with_header("message", "bad credentials")
        .encode();
    let (url, _seen) = spawn_stomp_server(error, false, Vec::new(), false).await;
    let mut connection = NotificationConnection::new(url, 4);
    let identity = StaticIdentity::new("me", "expired");

    let err = connection.connect(&identity).await.expect_err("rejected");
    assert!(matches!(err, ConnectionError::Rejected(ref detail) if detail == "bad credentials"));
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    let again = connection.connect(&identity).await.expect_err("no retry");
    assert!(matches!(
        again,
        ConnectionError::AlreadyStarted(ConnectionState::Disconnected)
    ));
}

#[tokio::test]
async fn server_close_ends_the_queue() {
    let pushes = vec![push(r#"{"chatId":"c9","type":"SEEN"}"#)];
    let (url, _seen) = spawn_stomp_server(connected(), true, pushes, true).await;
    let mut connection = NotificationConnection::new(url, 4);
    let mut state = connection.watch_state();

    let mut events = connection
        .connect(&StaticIdentity::new("me", "token"))
        .await
        .expect("connect");

    let only = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("in time")
        .expect("notification");
    assert_eq!(only.chat_id(), &ChatId::from("c9"));
    let end = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("closed in time");
    assert!(end.is_none());

    tokio::time::timeout(
        WAIT,
        state.wait_for(|current| *current == ConnectionState::Disconnected),
    )
    .await
    .expect("state in time")
    .expect("state channel");
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reader_exit_right_after_handshake_leaves_disconnected() {
    let broker_error = Frame::new(Command::Error)
        .with_header("message", "session expired")
        .encode();
    for round in 0..50 {
        let pushes = if round % 2 == 0 {
            Vec::new()
        } else {
            vec![broker_error.clone()]
        };
        let (url, _seen) = spawn_stomp_server(connected(), true, pushes, true).await;
        let mut connection = NotificationConnection::new(url, 4);

        let mut events = connection
            .connect(&StaticIdentity::new("me", "token"))
            .await
            .expect("connect");
        let end = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("queue closed in time");
        assert!(end.is_none());

        assert_eq!(
            connection.state(),
            ConnectionState::Disconnected,
            "round {round}"
        );
    }
}
