use super::*;

fn expect_notification(raw: &str) -> Notification {
    match decode_notification(raw).expect("decode") {
        Decoded::Notification(notification) => notification,
        other => panic!("expected notification, got {other:?}"),
    }
}

#[test]
fn decodes_message_with_defaults() {
    let notification = expect_notification(
        r#"{"chatId":"c1","senderId":"dana","receiverId":"me","content":"hi","type":"MESSAGE","chatName":"Dana"}"#,
    );
    assert_eq!(
        notification,
        Notification::Message {
            chat_id: ChatId::from("c1"),
            sender_id: UserId::from("dana"),
            receiver_id: UserId::from("me"),
            content: "hi".into(),
            message_kind: MessageKind::Text,
            chat_name: Some("Dana".into()),
        }
    );

    let empty = expect_notification(
        r#"{"chatId":"c1","senderId":"dana","recipientId":"me","type":"MESSAGE"}"#,
    );
    match empty {
        Notification::Message { content, .. } => assert_eq!(content, ""),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn decodes_image_media_and_seen() {
    let image = expect_notification(
        r#"{"chatId":"c2","senderId":"dana","receiverId":"me","type":"IMAGE","messageType":"IMAGE","media":"aGk="}"#,
    );
    assert_eq!(image.kind_label(), "image");
    match image {
        Notification::Image { media, content, .. } => {
            assert_eq!(media, vec!["aGk=".to_string()]);
            assert_eq!(content, None);
        }
        other => panic!("unexpected {other:?}"),
    }

    let seen = expect_notification(r#"{"chatId":"c3","type":"SEEN"}"#);
    assert_eq!(seen.chat_id(), &ChatId::from("c3"));
    assert!(matches!(seen, Notification::Seen { sender_id: None, .. }));
}

#[test]
fn unhandled_types_are_reported_not_failed() {
    for (raw, kind) in [
        (r#"{"chatId":"c1","type":"AUDIO"}"#, "AUDIO"),
        (r#"{"chatId":"c1","type":"VIDEO"}"#, "VIDEO"),
        (r#"{"chatId":"c1","type":"TYPING"}"#, "unknown"),
    ] {
        assert_eq!(
            decode_notification(raw).expect("decode"),
            Decoded::Unsupported { kind: kind.into() }
        );
    }
}

#[test]
fn malformed_frames_are_rejected() {
    assert!(matches!(
        decode_notification("not json"),
        Err(DecodeError::InvalidJson(_))
    ));
    assert!(matches!(
        decode_notification(r#"{"chatId":"c1"}"#),
        Err(DecodeError::MissingType)
    ));
    assert!(matches!(
        decode_notification(r#"{"chatId":"","type":"SEEN"}"#),
        Err(DecodeError::MissingChatId)
    ));
    assert!(matches!(
        decode_notification(r#"{"chatId":"c1","senderId":"dana","type":"MESSAGE"}"#),
        Err(DecodeError::MissingField {
            field: "receiverId",
            ..
        })
    ));
}
