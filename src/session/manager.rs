// src/session/manager.rs — Client-side session lifecycle
//
// NoSession --login--> ActiveSession --save ok--> NoSession
//                           |  ^ add_message
//                           +--cleanup--> NoSession
//
// The manager never touches the UI. Callers render after each transition.

use std::sync::Arc;

use super::cache::HistoryCache;
use super::{Session, SessionState};
use crate::backend::{
    BeaconPayload, HistorySummary, SaveResponse, SessionBackend, SessionDetail, SessionSnapshot,
};
use crate::infra::config::SessionConfig;
use crate::infra::errors::ChatError;
use crate::retry;

/// Result of `save_session_on_logout`. Never blocks logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Nothing to save: no session or no credentials.
    NoSession,
    /// The session had no messages and was discarded without a request.
    EmptySession,
    /// All attempts failed. The session stays in memory for a manual retry.
    Failed { error: String },
}

impl SaveOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SaveOutcome::Failed { .. })
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SaveOutcome::Saved => Some("saved"),
            SaveOutcome::NoSession => Some("no_session"),
            SaveOutcome::EmptySession => Some("empty_session"),
            SaveOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SaveOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Result of `add_message`. The append itself never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// No active session; nothing was recorded.
    NoSession,
    Persisted,
    /// Degraded mode (no token or user id): kept in memory only.
    PersistSkipped,
    /// Kept in memory; the immediate save failed and is not retried.
    PersistFailed { error: String },
}

#[derive(Debug, Clone)]
struct Credentials {
    user_id: String,
    auth_token: Option<String>,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    config: SessionConfig,
    credentials: Option<Credentials>,
    current: Option<Session>,
    cache: HistoryCache,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, config: SessionConfig) -> Self {
        let cache = HistoryCache::new(config.cache_duration());
        Self {
            backend,
            config,
            credentials: None,
            current: None,
            cache,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.current.is_some() {
            SessionState::ActiveSession
        } else {
            SessionState::NoSession
        }
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.user_id.as_str())
    }

    pub fn history_limit(&self) -> usize {
        self.config.history_limit
    }

    /// Adopt credentials from the auth layer without starting a session.
    pub fn authenticate(&mut self, auth_token: Option<String>, user_id: &str) {
        if self.user_id() != Some(user_id) {
            self.cache.invalidate();
        }
        if auth_token.is_none() {
            tracing::warn!("No auth token supplied; nothing will be persisted");
        }
        self.credentials = Some(Credentials {
            user_id: user_id.to_string(),
            auth_token,
        });
    }

    /// Begin a fresh session, discarding any session still in memory.
    /// Returns the new session id.
    pub fn start_new_session_on_login(
        &mut self,
        auth_token: Option<String>,
        user_id: &str,
    ) -> String {
        if let Some(prev) = self.current.take() {
            tracing::info!(
                session_id = %prev.session_id,
                messages = prev.messages().len(),
                "Discarding previous in-memory session"
            );
        }

        self.authenticate(auth_token.clone(), user_id);

        let session = Session::new(user_id, auth_token);
        let id = session.session_id.clone();
        tracing::info!(session_id = %id, user_id, "Started new chat session");
        self.current = Some(session);
        id
    }

    /// Record one exchange, then try to persist it once.
    pub async fn add_message(
        &mut self,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
    ) -> MessageOutcome {
        let auth = self.auth();
        let Some(session) = self.current.as_mut() else {
            tracing::warn!("add_message called without an active session; ignoring");
            return MessageOutcome::NoSession;
        };

        session.append(user_message.into(), bot_response.into());

        let Ok((token, _)) = auth else {
            return MessageOutcome::PersistSkipped;
        };
        let snapshot = snapshot_of(session);

        match self.backend.save_session(&token, &snapshot).await {
            Ok(_) => {
                self.cache.invalidate();
                MessageOutcome::Persisted
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %snapshot.session_id,
                    "Message kept locally, immediate save failed: {e}"
                );
                MessageOutcome::PersistFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Persist the whole session with retries. Safe to call in any state.
    /// Persistence needs both a token and a user id from the last login.
    pub async fn save_session_on_logout(&mut self) -> SaveOutcome {
        let Some(session) = self.current.as_ref() else {
            return SaveOutcome::NoSession;
        };
        if self.auth().is_err() {
            return SaveOutcome::NoSession;
        }
        if session.is_empty() {
            tracing::debug!(session_id = %session.session_id, "Discarding empty session");
            self.current = None;
            return SaveOutcome::EmptySession;
        }

        let snapshot = snapshot_of(session);
        match self.save_to_backend_with_retry(&snapshot).await {
            Ok(_) => {
                tracing::info!(
                    session_id = %snapshot.session_id,
                    messages = snapshot.message_count,
                    "Session saved"
                );
                self.current = None;
                self.cache.invalidate();
                SaveOutcome::Saved
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %snapshot.session_id,
                    "Session save failed, keeping it in memory: {e}"
                );
                SaveOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Send `snapshot` up to `max_save_attempts` times with linear backoff.
    /// A missing token fails immediately without using an attempt.
    pub async fn save_to_backend_with_retry(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<SaveResponse, ChatError> {
        let (token, _) = self.auth()?;
        let token = token.as_str();
        let backend = &self.backend;
        retry::retry(
            self.config.max_save_attempts,
            self.config.save_backoff(),
            |e: &ChatError| !matches!(e, ChatError::MissingCredentials),
            move |attempt| {
                tracing::debug!(session_id = %snapshot.session_id, attempt, "Saving session");
                backend.save_session(token, snapshot)
            },
        )
        .await
    }

    /// Hard reset after an authentication failure. No network calls.
    pub fn cleanup(&mut self) {
        self.current = None;
        self.credentials = None;
        self.cache.invalidate();
        tracing::debug!("Session manager reset");
    }

    /// The user's past sessions, served from cache while fresh.
    pub async fn fetch_user_history(&mut self) -> Result<Vec<HistorySummary>, ChatError> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached.to_vec());
        }

        let (token, user_id) = self.auth()?;
        let sessions = self.backend.fetch_sessions(&token, &user_id).await?;
        self.cache.store(sessions.clone());
        Ok(sessions)
    }

    pub fn invalidate_history_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Full message list of one past session.
    pub async fn load_session_messages(&self, session_id: &str) -> Result<SessionDetail, ChatError> {
        let (token, _) = self.auth()?;
        self.backend.fetch_session_messages(&token, session_id).await
    }

    /// Best-effort notification for an abrupt exit. Returns whether one was sent.
    pub fn notify_unload(&self) -> bool {
        match self.current.as_ref() {
            Some(session) if self.auth().is_ok() && !session.is_empty() => {
                self.backend
                    .send_beacon(BeaconPayload::save_session(&session.session_id));
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the active session, if any.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.current.as_ref().map(snapshot_of)
    }

    fn auth(&self) -> Result<(String, String), ChatError> {
        match &self.credentials {
            Some(Credentials {
                user_id,
                auth_token: Some(token),
            }) if !user_id.is_empty() => Ok((token.clone(), user_id.clone())),
            _ => Err(ChatError::MissingCredentials),
        }
    }
}

fn snapshot_of(session: &Session) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session.session_id.clone(),
        started_at: session.started_at,
        messages: session.messages().to_vec(),
        message_count: session.messages().len(),
        user_id: session.user_id.clone(),
    }
}
