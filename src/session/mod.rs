// src/session/mod.rs — Chat session model and lifecycle

pub mod cache;
pub mod manager;
pub mod preview;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use manager::{MessageOutcome, SaveOutcome, SessionManager};

/// One user/bot exchange. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    ActiveSession,
}

/// One continuous chat interaction, scoped to a login.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    /// `None` means degraded mode: nothing is persisted.
    pub auth_token: Option<String>,
    pub started_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(user_id: &str, auth_token: Option<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            auth_token,
            started_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Messages in insertion (chronological) order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append an exchange. Ids are creation timestamps in milliseconds,
    /// bumped when two messages land in the same millisecond.
    pub(crate) fn append(&mut self, user_message: String, bot_response: String) -> &Message {
        let now = Utc::now();
        let mut id = now.timestamp_millis();
        if let Some(last) = self.messages.last() {
            if id <= last.id {
                id = last.id + 1;
            }
        }

        self.messages.push(Message {
            id,
            user_message,
            bot_response,
            timestamp: now,
        });
        &self.messages[self.messages.len() - 1]
    }
}
