// src/backend/mod.rs — Chat backend API boundary
//
// The session manager only talks to the backend through `SessionBackend`,
// so tests can script responses without a network.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::ChatError;
use crate::session::Message;

pub use http::HttpBackend;

/// Remote persistence for chat sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// `POST /chat/sessions/save`
    async fn save_session(
        &self,
        auth_token: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveResponse, ChatError>;

    /// `GET /chat/sessions/{user_id}`
    async fn fetch_sessions(
        &self,
        auth_token: &str,
        user_id: &str,
    ) -> Result<Vec<HistorySummary>, ChatError>;

    /// `GET /chat/sessions/{session_id}/messages`
    async fn fetch_session_messages(
        &self,
        auth_token: &str,
        session_id: &str,
    ) -> Result<SessionDetail, ChatError>;

    /// `POST /chat/sessions/save-beacon`. Fire and forget: returns
    /// immediately and never reports whether delivery happened.
    fn send_beacon(&self, payload: BeaconPayload);
}

/// Full session payload sent on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub message_count: usize,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A past session as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(default, alias = "started_at")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "message_count")]
    pub message_count: usize,
    #[serde(default)]
    pub preview: Option<String>,
    /// Present only when the backend inlines the messages.
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub sessions: Vec<HistorySummary>,
}

/// Drill-down into one past session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(default, alias = "started_at")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Reduced-fidelity save sent when the client is going away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconPayload {
    pub session_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl BeaconPayload {
    pub fn save_session(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            action: "save_session".into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_uses_camel_case() {
        let snap = SessionSnapshot {
            session_id: "s1".into(),
            started_at: Utc::now(),
            messages: vec![],
            message_count: 0,
            user_id: "u1".into(),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["messageCount"], 0);
        assert!(json.get("startedAt").is_some());
    }

    #[test]
    fn test_history_summary_accepts_both_casings() {
        let camel: HistorySummary = serde_json::from_str(
            r#"{"sessionId":"a","startedAt":"2026-01-01T00:00:00Z","messageCount":3,"preview":"hi"}"#,
        )
        .unwrap();
        let snake: HistorySummary = serde_json::from_str(
            r#"{"session_id":"a","started_at":"2026-01-01T00:00:00Z","message_count":3,"preview":"hi"}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.message_count, 3);
    }

    #[test]
    fn test_history_summary_minimal() {
        let s: HistorySummary = serde_json::from_str(r#"{"sessionId":"a"}"#).unwrap();
        assert!(s.started_at.is_none());
        assert!(s.messages.is_none());
    }

    #[test]
    fn test_beacon_payload_shape() {
        let p = BeaconPayload::save_session("s9");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["session_id"], "s9");
        assert_eq!(json["action"], "save_session");
        assert!(json["timestamp"].is_string());
    }
}
