// src/infra/errors.rs — Error types for chatkeep

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    // Backend errors (non-2xx responses)
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    // Caller errors (never retried)
    #[error("Missing credentials: login with a user id and token first")]
    MissingCredentials,

    // Transport
    #[error("Could not reconnect after {attempts} attempts. Reload to try again.")]
    ReconnectExhausted { attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    Protocol(String),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChatError {
    /// Transient failures worth another attempt: 5xx, 429 and transport-level I/O.
    pub fn is_retriable(&self) -> bool {
        match self {
            ChatError::Backend { status, .. } => *status >= 500 || *status == 429,
            ChatError::Network { .. } => true,
            _ => false,
        }
    }

    /// The backend rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ChatError::Backend { status: 401 | 403, .. })
    }

    /// Failures that need user intervention (e.g. a manual reload).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatError::ReconnectExhausted { .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ChatError::Backend {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => ChatError::Network {
                message: e.to_string(),
            },
        }
    }
}
