// src/cli/history.rs — One-shot history listing and session display

use std::sync::Arc;

use chrono::Utc;

use super::Login;
use crate::backend::http::HttpBackend;
use crate::infra::config::Config;
use crate::session::SessionManager;
use crate::ui::{self, ChatView, HistoryPanel, TerminalView};

fn manager_for(config: &Config, login: &Login) -> anyhow::Result<SessionManager> {
    if login.token.is_none() {
        anyhow::bail!("a token is required to read history: pass --token or set CHATKEEP_TOKEN");
    }
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let mut manager = SessionManager::new(backend, config.session.clone());
    manager.authenticate(login.token.clone(), &login.user_id);
    Ok(manager)
}

/// `chatkeep history`
pub async fn run_history(config: &Config, login: Login, quiet: bool) -> anyhow::Result<()> {
    let mut manager = manager_for(config, &login)?;
    let mut view = TerminalView::stdout(quiet);

    match ui::load_history_panel(&mut manager, &mut view, Utc::now()).await {
        HistoryPanel::Error { message } => anyhow::bail!("could not load history: {message}"),
        _ => Ok(()),
    }
}

/// `chatkeep show <session_id>`
pub async fn run_show(
    config: &Config,
    login: Login,
    session_id: &str,
    quiet: bool,
) -> anyhow::Result<()> {
    let manager = manager_for(config, &login)?;
    let detail = manager.load_session_messages(session_id).await?;
    TerminalView::stdout(quiet).render_session_detail(session_id, &detail);
    Ok(())
}
