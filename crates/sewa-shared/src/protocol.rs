//! Frames exchanged over a booking's real-time channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BookingId, MessageId, UserId};

/// A frame sent by a client. Only chat messages flow upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A frame pushed to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A message as persisted by the conversation service.
    ChatMessage(ChatFrame),

    /// Failure of this connection's own request. Never broadcast.
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatFrame {
    pub id: MessageId,
    pub booking_id: BookingId,
    /// Position in the booking's conversation.
    pub seq: i64,
    pub sender_id: UserId,
    /// Sender display name.
    pub user: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OutboundFrame {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundFrame::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_parse() {
        let frame = InboundFrame::parse(r#"{"message":"Hello"}"#).unwrap();
        assert_eq!(frame.message, "Hello");
        assert!(InboundFrame::parse("Hello").is_err());
        assert!(InboundFrame::parse(r#"{"body":"Hello"}"#).is_err());
    }

    #[test]
    fn test_outbound_tagging() {
        let json = OutboundFrame::error("Message body must not be empty")
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Message body must not be empty");

        let frame = OutboundFrame::ChatMessage(ChatFrame {
            id: MessageId::new(),
            booking_id: BookingId::new(),
            seq: 3,
            sender_id: UserId::new(),
            user: "u1".into(),
            message: "Hello".into(),
            timestamp: Utc::now(),
        });
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["user"], "u1");
        assert_eq!(value["seq"], 3);
    }
}
