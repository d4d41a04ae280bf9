// src/cli/chat.rs — Interactive REPL

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use super::Login;
use crate::backend::http::HttpBackend;
use crate::infra::config::Config;
use crate::session::{MessageOutcome, SaveOutcome, SessionManager};
use crate::transport::client::TransportClient;
use crate::transport::{ConnectionState, InboundMessage, TransportEvent};
use crate::ui::{self, ChatView, Notice, TerminalView};

/// Time given to the unload notification before the process exits.
const UNLOAD_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlashCommand {
    Quit,
    History,
    Show(String),
    Status,
    New,
    Help,
    Unknown(String),
}

/// `None` for plain chat text.
fn parse_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if trimmed == "quit" || trimmed == "exit" {
        return Some(SlashCommand::Quit);
    }
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or("");

    Some(match cmd {
        "/quit" | "/exit" => SlashCommand::Quit,
        "/history" => SlashCommand::History,
        "/show" if !arg.is_empty() => SlashCommand::Show(arg.to_string()),
        "/status" => SlashCommand::Status,
        "/new" => SlashCommand::New,
        "/help" => SlashCommand::Help,
        other => SlashCommand::Unknown(other.to_string()),
    })
}

enum Flow {
    Continue,
    Quit,
}

/// How the REPL loop ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    /// `/quit` or end of input: save, then disconnect.
    Quit,
    /// Interrupt signal: best-effort beacon only.
    Interrupted,
}

struct ChatState<V: ChatView> {
    manager: SessionManager,
    transport: TransportClient,
    view: V,
    /// User lines awaiting a bot reply, oldest first.
    pending: VecDeque<String>,
    user_id: String,
    token: Option<String>,
}

/// Run the interactive chat REPL.
pub async fn run_chat(config: &Config, login: Login, quiet: bool) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let mut manager = SessionManager::new(backend, config.session.clone());
    let mut view = TerminalView::stdout(quiet);

    let session_id = manager.start_new_session_on_login(login.token.clone(), &login.user_id);
    view.reset_to_welcome(&session_id);

    if login.token.is_some() {
        // Warm the history cache and surface rejected credentials early
        if let Err(e) = manager.fetch_user_history().await {
            if e.is_auth_failure() {
                manager.cleanup();
                anyhow::bail!("login rejected by the chat backend: {e}");
            }
            view.notify(Notice::Warning, &format!("History unavailable: {e}"));
        }
    } else {
        view.notify(
            Notice::Warning,
            "No token supplied. This conversation will not be saved.",
        );
    }

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let transport = TransportClient::new(config.transport.clone(), &login.user_id, move |event| {
        let _ = event_tx.send(event);
    })?;
    transport.connect();

    let mut state = ChatState {
        manager,
        transport,
        view,
        pending: VecDeque::new(),
        user_id: login.user_id,
        token: login.token,
    };

    let lines = BufReader::new(tokio::io::stdin()).lines();
    state.view.focus_composer();

    match drive(&mut state, lines, &mut events, tokio::signal::ctrl_c()).await? {
        Exit::Quit => state.logout().await,
        Exit::Interrupted => {
            if state.manager.notify_unload() {
                tokio::time::sleep(UNLOAD_GRACE).await;
            }
            state.transport.disconnect();
            eprintln!();
        }
    }
    Ok(())
}

/// Multiplex user input, transport events and `shutdown` until one ends
/// the session. `shutdown` is polled as a single future for the whole loop.
async fn drive<V, R, F, T>(
    state: &mut ChatState<V>,
    mut lines: Lines<R>,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    shutdown: F,
) -> anyhow::Result<Exit>
where
    V: ChatView,
    R: AsyncBufRead + Unpin,
    F: Future<Output = T>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(Exit::Interrupted),
            line = lines.next_line() => {
                // EOF ends the session like /quit
                let Some(line) = line? else { return Ok(Exit::Quit) };
                if let Flow::Quit = state.handle_input(&line).await {
                    return Ok(Exit::Quit);
                }
                state.view.focus_composer();
            }
            Some(event) = events.recv() => {
                state.handle_event(event).await;
            }
        }
    }
}

impl<V: ChatView> ChatState<V> {
    async fn handle_input(&mut self, input: &str) -> Flow {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Flow::Continue;
        }

        match parse_command(trimmed) {
            Some(SlashCommand::Quit) => return Flow::Quit,
            Some(command) => self.handle_command(command).await,
            None => {
                let session_id = self
                    .manager
                    .current_session()
                    .map(|s| s.session_id.clone());
                self.pending.push_back(trimmed.to_string());
                self.transport
                    .send_chat_message(trimmed, session_id.as_deref());
            }
        }
        Flow::Continue
    }

    async fn handle_command(&mut self, command: SlashCommand) {
        match command {
            SlashCommand::History => {
                ui::load_history_panel(&mut self.manager, &mut self.view, Utc::now()).await;
            }
            SlashCommand::Show(session_id) => {
                match self.manager.load_session_messages(&session_id).await {
                    Ok(detail) => self.view.render_session_detail(&session_id, &detail),
                    Err(e) => self
                        .view
                        .notify(Notice::Error, &format!("Could not load {session_id}: {e}")),
                }
            }
            SlashCommand::Status => {
                let status = self.transport.status();
                let (session, messages) = self
                    .manager
                    .current_session()
                    .map(|s| (s.session_id.clone(), s.messages().len()))
                    .unwrap_or_else(|| ("none".into(), 0));
                eprintln!("  User: {}", self.user_id);
                eprintln!("  Session: {session} | {messages} message(s)");
                eprintln!(
                    "  Connection: {} | reconnect attempts: {} | queued: {}",
                    status.state, status.reconnect_attempts, status.queued_message_count
                );
            }
            SlashCommand::New => {
                let outcome = self.manager.save_session_on_logout().await;
                self.report_save(&outcome);
                let id = self
                    .manager
                    .start_new_session_on_login(self.token.clone(), &self.user_id);
                self.pending.clear();
                self.view.reset_to_welcome(&id);
            }
            SlashCommand::Help => {
                eprintln!("Slash commands:");
                eprintln!("  /history           List past conversations");
                eprintln!("  /show <session>    Print a past conversation");
                eprintln!("  /status            Show session and connection status");
                eprintln!("  /new               Save this conversation and start another");
                eprintln!("  /help              Show this help");
                eprintln!("  /quit, quit, exit  Save and end session");
            }
            SlashCommand::Unknown(cmd) => {
                eprintln!("Unknown command: {cmd}. Type /help for commands.");
            }
            SlashCommand::Quit => {}
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::MessageReceived(InboundMessage::ChatResponse {
                message,
                user_message,
            }) => {
                let asked = self
                    .pending
                    .pop_front()
                    .or(user_message)
                    .unwrap_or_default();
                let outcome = self.manager.add_message(asked, message).await;
                if let Some(last) = self
                    .manager
                    .current_session()
                    .and_then(|s| s.messages().last())
                {
                    self.view.render_message(last);
                }
                if let MessageOutcome::PersistFailed { error } = outcome {
                    self.view
                        .notify(Notice::Warning, &format!("Message not saved yet: {error}"));
                }
                self.view.focus_composer();
            }
            TransportEvent::MessageReceived(InboundMessage::ChatHistory { messages }) => {
                for message in &messages {
                    self.view.render_message(message);
                }
            }
            TransportEvent::MessageReceived(_) => {}
            TransportEvent::TypingChanged(typing) => self.view.show_typing(typing),
            TransportEvent::StatusChanged(ConnectionState::Connected) => {
                self.view.notify(Notice::Info, "Connected");
            }
            TransportEvent::StatusChanged(_) => {}
            TransportEvent::Reconnecting { attempt, delay } => {
                self.view.notify(
                    Notice::Warning,
                    &format!(
                        "Connection lost. Reconnecting in {}s (attempt {attempt})",
                        delay.as_secs_f32()
                    ),
                );
            }
            TransportEvent::Error { message, terminal } => {
                let level = if terminal {
                    Notice::Error
                } else {
                    Notice::Warning
                };
                self.view.notify(level, &message);
            }
        }
    }

    async fn logout(&mut self) {
        let outcome = self.manager.save_session_on_logout().await;
        self.report_save(&outcome);
        self.transport.disconnect();
    }

    /// Save results are advisory; logout always proceeds.
    fn report_save(&mut self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::Saved => self.view.notify(Notice::Success, "Conversation saved"),
            SaveOutcome::EmptySession | SaveOutcome::NoSession => {}
            SaveOutcome::Failed { error } => self.view.notify(
                Notice::Error,
                &format!("Could not save conversation: {error}"),
            ),
        }
    }
}
