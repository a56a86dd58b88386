use std::fmt::Display;

use chrono::TimeZone;
use parley_core::{
    ChatMessage, ConnectionState, Delivery, DropReason, MessageKind, PresenceEvent, PresenceKind,
};

pub fn message_line<Tz>(message: &ChatMessage, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = message.timestamp().with_timezone(tz).format("%H:%M");
    format!("[{time}] {}: {}", message.sender(), body(message))
}

fn body(message: &ChatMessage) -> String {
    if message.kind() == MessageKind::Text {
        return message.content().to_string();
    }
    let size = message
        .payload()
        .map(|p| human_size(p.data().len()))
        .unwrap_or_else(|| "?".to_string());
    match (message.kind(), message.file_name()) {
        (MessageKind::Audio, _) => format!("<voice clip, {size}>"),
        (kind, Some(name)) => format!("<{kind} {name}, {size}>"),
        (kind, None) => format!("<{kind}, {size}>"),
    }
}

/// Toast shown when someone enters or leaves the room.
pub fn presence_line(presence: &PresenceEvent) -> String {
    match presence.kind {
        PresenceKind::Joined => format!("{} has joined the chat", presence.username),
        PresenceKind::Left => format!("{} has left the chat", presence.username),
    }
}

pub fn state_line(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting...",
        ConnectionState::Connected => "connected",
    }
}

/// Why something typed did not go out, if it didn't.
pub fn delivery_note<T>(delivery: &Delivery<T>) -> Option<&'static str> {
    match delivery {
        Delivery::Sent(_) => None,
        Delivery::Pending => Some("will be sent once connected"),
        Delivery::Dropped(DropReason::NotConnected) => Some("not connected, try /connect"),
        Delivery::Dropped(DropReason::NoActiveRoom) => Some("not in a room, try /join <room>"),
    }
}

fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(json: &str) -> ChatMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_line() {
        let m = message(
            r#"{"id":"1","kind":"text","content":"hi","sender":"alice","timestamp":"2024-05-01T10:04:00Z"}"#,
        );
        assert_eq!(message_line(&m, &Utc), "[10:04] alice: hi");
    }

    #[test]
    fn test_image_line_shows_name_and_size() {
        let m = message(
            r#"{"id":"2","kind":"image","content":"data:image/png;base64,AAAA","sender":"bob","timestamp":"2024-05-01T10:04:00Z","fileName":"cat.png"}"#,
        );
        assert_eq!(message_line(&m, &Utc), "[10:04] bob: <image cat.png, 3 B>");
    }

    #[test]
    fn test_audio_line() {
        let m = message(
            r#"{"id":"3","kind":"audio","content":"data:audio/ogg;base64,AAAA","sender":"bob","timestamp":"2024-05-01T10:04:00Z"}"#,
        );
        assert_eq!(message_line(&m, &Utc), "[10:04] bob: <voice clip, 3 B>");
    }

    #[test]
    fn test_presence_toasts() {
        let joined = PresenceEvent {
            username: "bob".into(),
            kind: PresenceKind::Joined,
        };
        let left = PresenceEvent {
            username: "bob".into(),
            kind: PresenceKind::Left,
        };
        assert_eq!(presence_line(&joined), "bob has joined the chat");
        assert_eq!(presence_line(&left), "bob has left the chat");
    }

    #[test]
    fn test_delivery_note() {
        assert_eq!(delivery_note(&Delivery::Sent(())), None);
        assert!(delivery_note::<()>(&Delivery::Dropped(DropReason::NoActiveRoom))
            .unwrap()
            .contains("/join"));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(12), "12 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
