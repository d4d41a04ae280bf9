// src/ui/mod.rs — Presentation boundary
//
// The session manager never renders. Callers compute a view model here and
// hand it to a `ChatView` after each state transition.

pub mod terminal;

use chrono::{DateTime, Utc};

use crate::backend::{HistorySummary, SessionDetail};
use crate::infra::errors::ChatError;
use crate::session::preview::{get_session_preview, get_time_ago, truncate_preview, EMPTY_PREVIEW};
use crate::session::{Message, Session, SessionManager};

pub use terminal::TerminalView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Success,
    Warning,
    Error,
}

/// Everything a front end must be able to draw.
pub trait ChatView {
    /// Clear the conversation surface and show the welcome state.
    fn reset_to_welcome(&mut self, session_id: &str);
    fn focus_composer(&mut self);
    fn render_message(&mut self, message: &Message);
    fn render_history(&mut self, panel: &HistoryPanel);
    fn render_session_detail(&mut self, session_id: &str, detail: &SessionDetail);
    fn show_typing(&mut self, typing: bool);
    fn notify(&mut self, level: Notice, text: &str);
}

/// The in-progress session, listed above past ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub session_id: String,
    pub preview: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub session_id: String,
    pub preview: String,
    pub time_ago: String,
    pub message_count: usize,
}

/// Exactly one of these is shown at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryPanel {
    Loading,
    Empty,
    Error {
        message: String,
    },
    Populated {
        active: Option<ActiveEntry>,
        items: Vec<HistoryItem>,
    },
}

/// Pure view-model builder for the history panel.
///
/// Past sessions keep backend order (most recent first) and are capped at
/// `limit`. The active session is listed separately when it has messages,
/// and filtered out of the past list if the backend already knows it.
pub fn build_history_panel(
    history: Result<&[HistorySummary], &ChatError>,
    active: Option<&Session>,
    limit: usize,
    now: DateTime<Utc>,
) -> HistoryPanel {
    let sessions = match history {
        Ok(sessions) => sessions,
        Err(e) => {
            return HistoryPanel::Error {
                message: e.to_string(),
            }
        }
    };

    let active = active.filter(|s| !s.is_empty()).map(|s| ActiveEntry {
        session_id: s.session_id.clone(),
        preview: get_session_preview(s.messages()),
        message_count: s.messages().len(),
    });

    let items: Vec<HistoryItem> = sessions
        .iter()
        .filter(|h| active.as_ref().map_or(true, |a| a.session_id != h.session_id))
        .take(limit)
        .map(|h| HistoryItem {
            session_id: h.session_id.clone(),
            preview: summary_preview(h),
            time_ago: h
                .started_at
                .map(|t| get_time_ago(t, now))
                .unwrap_or_else(|| "unknown".to_string()),
            message_count: h.message_count,
        })
        .collect();

    if items.is_empty() && active.is_none() {
        HistoryPanel::Empty
    } else {
        HistoryPanel::Populated { active, items }
    }
}

fn summary_preview(summary: &HistorySummary) -> String {
    match (&summary.preview, &summary.messages) {
        (Some(p), _) if !p.is_empty() => truncate_preview(p),
        (_, Some(messages)) => get_session_preview(messages),
        _ => EMPTY_PREVIEW.to_string(),
    }
}

/// Show the loading state, fetch (possibly from cache), then show the result.
pub async fn load_history_panel(
    manager: &mut SessionManager,
    view: &mut dyn ChatView,
    now: DateTime<Utc>,
) -> HistoryPanel {
    view.render_history(&HistoryPanel::Loading);

    let history = manager.fetch_user_history().await;
    let panel = build_history_panel(
        history.as_deref(),
        manager.current_session(),
        manager.history_limit(),
        now,
    );

    view.render_history(&panel);
    panel
}
