use super::*;
use serde_json::json;

#[test]
fn chat_summary_reads_server_shape() {
    let chat: ChatSummary = serde_json::from_value(json!({
        "id": "c-1",
        "name": "Dana Scully",
        "unreadCount": 3,
        "lastMessage": "see you",
        "lastMessageTime": "2024-05-01T10:15:30.123456",
        "recipientOnline": true,
        "senderId": "u-1",
        "recipientId": "u-2"
    }))
    .expect("chat");

    assert_eq!(chat.id, ChatId::from("c-1"));
    assert_eq!(chat.unread_count, 3);
    assert!(chat.recipient_online);
    assert!(chat.last_message_time.is_some());
    assert_eq!(chat.counterpart(&UserId::from("u-1")), &UserId::from("u-2"));
    assert_eq!(chat.counterpart(&UserId::from("u-2")), &UserId::from("u-1"));
}

#[test]
fn chat_summary_accepts_is_prefixed_online_flag() {
    let chat: ChatSummary = serde_json::from_value(json!({
        "id": "c-1",
        "senderId": "u-1",
        "recipientId": "u-2",
        "isRecipientOnline": true
    }))
    .expect("chat");
    assert!(chat.recipient_online);
    assert_eq!(chat.unread_count, 0);
    assert_eq!(chat.last_message, None);
}

#[test]
fn message_media_accepts_single_blob_or_list() {
    let single: MessagePayload = serde_json::from_value(json!({
        "senderId": "u-1",
        "recipientId": "u-2",
        "type": "IMAGE",
        "state": "SEEN",
        "media": "aGVsbG8="
    }))
    .expect("single");
    assert_eq!(single.media, vec!["aGVsbG8=".to_string()]);
    assert_eq!(single.state, MessageState::Seen);

    let many: MessagePayload = serde_json::from_value(json!({
        "senderId": "u-1",
        "recipientId": "u-2",
        "type": "IMAGE",
        "media": ["YQ==", "Yg=="]
    }))
    .expect("many");
    assert_eq!(many.media.len(), 2);
    assert_eq!(many.state, MessageState::Sent);

    let none: MessagePayload = serde_json::from_value(json!({
        "senderId": "u-1",
        "recipientId": "u-2",
        "type": "TEXT",
        "media": null
    }))
    .expect("none");
    assert!(none.media.is_empty());
}

#[test]
fn notification_frame_accepts_recipient_alias_and_unknown_type() {
    let frame: NotificationFrame = serde_json::from_value(json!({
        "type": "TYPING",
        "chatId": "c-9",
        "senderId": "u-1",
        "recipientId": "u-2"
    }))
    .expect("frame");
    assert_eq!(frame.kind, Some(NotificationType::Other));
    assert_eq!(frame.receiver_id, Some(UserId::from("u-2")));
}

#[test]
fn message_request_serializes_type_field() {
    let request = MessageRequest {
        chat_id: ChatId::from("c-1"),
        sender_id: UserId::from("u-1"),
        recipient_id: UserId::from("u-2"),
        content: "hi".into(),
        kind: MessageKind::Text,
    };
    let value = serde_json::to_value(&request).expect("json");
    assert_eq!(value["type"], "TEXT");
    assert_eq!(value["chatId"], "c-1");
    assert_eq!(value["recipientId"], "u-2");
}

#[test]
fn user_display_name_joins_first_and_last() {
    let user: UserSummary = serde_json::from_value(json!({
        "id": "u-3",
        "firstName": "Fox",
        "lastName": "Mulder",
        "isOnline": true
    }))
    .expect("user");
    assert_eq!(user.display_name(), "Fox Mulder");
    assert!(user.online);
}
