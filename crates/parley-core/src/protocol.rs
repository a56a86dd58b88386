//! Wire format for the chat event channel.
//!
//! Every frame is one JSON text frame of the form
//! `{"event": "<name>", "data": {...}}`. Intents flow client → server,
//! pushes flow server → client. Nothing is acknowledged.

use serde::{Deserialize, Serialize};

use crate::errors::ParleyError;
use crate::message::ChatMessage;

/// A message tagged with the room it is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub room_id: String,
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// A message pushed by the server. The room id is optional since the
/// server only ever forwards traffic for the room this client is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientIntent {
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    Message(RoomMessage),
}

impl ClientIntent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientIntent::JoinRoom { .. } => "join_room",
            ClientIntent::LeaveRoom { .. } => "leave_room",
            ClientIntent::Message(_) => "message",
        }
    }

    pub fn to_frame(&self) -> Result<String, ParleyError> {
        serde_json::to_string(self)
            .map_err(|e| ParleyError::Protocol(format!("encode {}: {e}", self.name())))
    }

    pub fn from_frame(frame: &str) -> Result<Self, ParleyError> {
        serde_json::from_str(frame)
            .map_err(|e| ParleyError::Protocol(format!("decode intent: {e}")))
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerPush {
    Message(PushedMessage),
    UserJoined { username: String },
    UserLeft { username: String },
    Error { reason: String },
}

impl ServerPush {
    pub fn to_frame(&self) -> Result<String, ParleyError> {
        serde_json::to_string(self).map_err(|e| ParleyError::Protocol(format!("encode push: {e}")))
    }

    pub fn from_frame(frame: &str) -> Result<Self, ParleyError> {
        serde_json::from_str(frame).map_err(|e| ParleyError::Protocol(format!("decode push: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_frame_shape() {
        let frame = ClientIntent::JoinRoom { room_id: "lobby".into() }.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "join_room", "data": {"roomId": "lobby"}}));
    }

    #[test]
    fn leave_room_frame_shape() {
        let frame = ClientIntent::LeaveRoom { room_id: "lobby".into() }.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "leave_room", "data": {"roomId": "lobby"}}));
    }

    #[test]
    fn message_intent_is_flat() {
        let push = json!({
            "event": "message",
            "data": {
                "roomId": "lobby",
                "id": "m1",
                "kind": "text",
                "content": "hi",
                "sender": "alice",
                "timestamp": "2024-05-01T10:00:00Z"
            }
        });
        let intent = ClientIntent::from_frame(&push.to_string()).unwrap();
        let ClientIntent::Message(room_msg) = &intent else {
            panic!("expected message intent");
        };
        assert_eq!(room_msg.room_id, "lobby");
        assert_eq!(room_msg.message.content(), "hi");

        let back: serde_json::Value = serde_json::from_str(&intent.to_frame().unwrap()).unwrap();
        assert_eq!(back["data"]["roomId"], "lobby");
        assert_eq!(back["data"]["sender"], "alice");
        assert!(back["data"].get("message").is_none());
    }

    #[test]
    fn presence_pushes_decode() {
        let frame = r#"{"event":"user_joined","data":{"username":"bob"}}"#;
        let push = ServerPush::from_frame(frame).unwrap();
        assert_eq!(push, ServerPush::UserJoined { username: "bob".into() });

        let frame = r#"{"event":"user_left","data":{"username":"bob"}}"#;
        let push = ServerPush::from_frame(frame).unwrap();
        assert_eq!(push, ServerPush::UserLeft { username: "bob".into() });
    }

    #[test]
    fn error_push_decodes() {
        let frame = r#"{"event":"error","data":{"reason":"auth rejected"}}"#;
        let push = ServerPush::from_frame(frame).unwrap();
        assert_eq!(push, ServerPush::Error { reason: "auth rejected".into() });
    }

    #[test]
    fn pushed_message_without_room() {
        let frame = r#"{"event":"message","data":{"id":"1","type":"text","content":"yo","sender":"bob","timestamp":"2024-05-01T10:00:00Z"}}"#;
        let ServerPush::Message(pushed) = ServerPush::from_frame(frame).unwrap() else {
            panic!("expected message push");
        };
        assert!(pushed.room_id.is_none());
        assert_eq!(pushed.message.sender(), "bob");
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(ServerPush::from_frame(r#"{"event":"typing","data":{}}"#).is_err());
        assert!(ServerPush::from_frame("not json").is_err());
    }
}
