// src/transport/mod.rs — Real-time push channel: wire envelopes and events
//
// Every frame is a JSON object with a `type` discriminator. Outbound frames
// carry a `timestamp` alongside the payload fields.

pub mod client;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::ChatError;
use crate::session::Message;

pub use client::TransportClient;

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ChatMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    GetHistory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    TypingStart,
    TypingStop,
    Ping,
}

/// An outbound message stamped with its creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: OutboundMessage,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(message: OutboundMessage) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Messages the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ConnectionEstablished {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    ChatResponse {
        #[serde(alias = "response")]
        message: String,
        #[serde(default)]
        user_message: Option<String>,
    },
    BotTyping {
        #[serde(default)]
        is_typing: bool,
    },
    ChatHistory {
        #[serde(default)]
        messages: Vec<Message>,
    },
    Error {
        message: String,
    },
    Pong,
}

const KNOWN_INBOUND: &[&str] = &[
    "connection_established",
    "chat_response",
    "bot_typing",
    "chat_history",
    "error",
    "pong",
];

/// Parse one text frame. Unknown `type`s yield `Ok(None)`.
pub fn parse_inbound(text: &str) -> Result<Option<InboundMessage>, ChatError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_owned)
        .ok_or_else(|| ChatError::Protocol("frame has no 'type' field".into()))?;

    if !KNOWN_INBOUND.contains(&kind.as_str()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ChatError::Protocol(format!("bad '{kind}' frame: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub queued_message_count: usize,
}

/// Notifications delivered to the caller-supplied handler.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StatusChanged(ConnectionState),
    MessageReceived(InboundMessage),
    TypingChanged(bool),
    Reconnecting { attempt: u32, delay: Duration },
    /// `terminal` errors end automatic reconnection.
    Error { message: String, terminal: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_envelope_flattens_payload() {
        let env = Envelope::new(OutboundMessage::ChatMessage {
            message: "hello".into(),
            session_id: None,
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "chat_message");
        assert_eq!(json["message"], "hello");
        assert!(json.get("session_id").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_unit_envelopes() {
        for (msg, kind) in [
            (OutboundMessage::TypingStart, "typing_start"),
            (OutboundMessage::TypingStop, "typing_stop"),
            (OutboundMessage::Ping, "ping"),
        ] {
            let json = serde_json::to_value(Envelope::new(msg)).unwrap();
            assert_eq!(json["type"], kind);
        }
    }

    #[test]
    fn test_envelope_reads_back() {
        let text = r#"{"type":"get_history","limit":10,"timestamp":"2026-01-01T00:00:00Z"}"#;
        let env: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(env.message, OutboundMessage::GetHistory { limit: Some(10) });
    }

    #[test]
    fn test_parse_chat_response() {
        let msg = parse_inbound(r#"{"type":"chat_response","message":"hi there"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::ChatResponse {
                message: "hi there".into(),
                user_message: None
            }
        );
    }

    #[test]
    fn test_parse_response_alias() {
        let msg = parse_inbound(r#"{"type":"chat_response","response":"yo"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(msg, InboundMessage::ChatResponse { message, .. } if message == "yo"));
    }

    #[test]
    fn test_parse_typing_and_pong() {
        let typing = parse_inbound(r#"{"type":"bot_typing","is_typing":true}"#).unwrap();
        assert_eq!(typing, Some(InboundMessage::BotTyping { is_typing: true }));
        let pong = parse_inbound(r#"{"type":"pong","timestamp":"2026-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(pong, Some(InboundMessage::Pong));
    }

    #[test]
    fn test_parse_unknown_type_ignored() {
        assert_eq!(parse_inbound(r#"{"type":"weather","temp":3}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_inbound("not json").is_err());
        assert!(matches!(
            parse_inbound(r#"{"message":"no type"}"#),
            Err(ChatError::Protocol(_))
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"error"}"#),
            Err(ChatError::Protocol(_))
        ));
    }

    #[test]
    fn test_malformed_known_frame_names_its_type() {
        let err = parse_inbound(r#"{"type":"chat_history","messages":"nope"}"#).unwrap_err();
        assert!(err.to_string().contains("'chat_history'"), "{err}");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = TransportStatus {
            connected: false,
            state: ConnectionState::Reconnecting,
            reconnect_attempts: 2,
            queued_message_count: 4,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "reconnecting");
        assert_eq!(json["reconnectAttempts"], 2);
        assert_eq!(json["queuedMessageCount"], 4);
    }
}
