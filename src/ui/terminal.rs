// src/ui/terminal.rs — Plain-text ChatView for the terminal
//
// Conversation goes to the writer (stdout by default); notices go to stderr
// so piping the transcript stays clean.

use std::io::{self, Write};

use super::{ChatView, HistoryPanel, Notice};
use crate::backend::SessionDetail;
use crate::session::Message;

pub struct TerminalView<W: Write> {
    out: W,
    quiet: bool,
}

impl TerminalView<io::Stdout> {
    pub fn stdout(quiet: bool) -> Self {
        Self {
            out: io::stdout(),
            quiet,
        }
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out, quiet: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // A closed stdout is not worth crashing the session over
        let _ = writeln!(self.out, "{text}");
    }
}

impl<W: Write> ChatView for TerminalView<W> {
    fn reset_to_welcome(&mut self, session_id: &str) {
        self.line("");
        self.line("Welcome! Ask me anything. Type /help for commands.");
        if !self.quiet {
            self.line(&format!("(session {})", short_id(session_id)));
        }
    }

    fn focus_composer(&mut self) {
        let _ = write!(self.out, "> ");
        let _ = self.out.flush();
    }

    fn render_message(&mut self, message: &Message) {
        let time = message.timestamp.format("%H:%M");
        self.line(&format!("[{time}] you: {}", message.user_message));
        self.line(&format!("[{time}] bot: {}", message.bot_response));
    }

    fn render_history(&mut self, panel: &HistoryPanel) {
        match panel {
            HistoryPanel::Loading => {
                if !self.quiet {
                    self.line("Loading history...");
                }
            }
            HistoryPanel::Empty => self.line("No previous conversations yet."),
            HistoryPanel::Error { message } => {
                self.line(&format!("Could not load history: {message}"));
                self.line("Run /history to try again.");
            }
            HistoryPanel::Populated { active, items } => {
                if let Some(active) = active {
                    self.line(&format!(
                        "* current  {}  ({} messages)",
                        active.preview, active.message_count
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    self.line(&format!(
                        "{:>3}. {}  - {} - {} messages [{}]",
                        i + 1,
                        item.preview,
                        item.time_ago,
                        item.message_count,
                        short_id(&item.session_id)
                    ));
                }
            }
        }
    }

    fn render_session_detail(&mut self, session_id: &str, detail: &SessionDetail) {
        let started = detail
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".into());
        self.line(&format!("Session {session_id} (started {started})"));
        if detail.messages.is_empty() {
            self.line("  (no messages)");
        }
        for message in &detail.messages {
            self.render_message(message);
        }
    }

    fn show_typing(&mut self, typing: bool) {
        if typing {
            eprintln!("bot is typing...");
        }
    }

    fn notify(&mut self, level: Notice, text: &str) {
        let tag = match level {
            Notice::Info => "info",
            Notice::Success => "ok",
            Notice::Warning => "warn",
            Notice::Error => "error",
        };
        if level == Notice::Info && self.quiet {
            return;
        }
        eprintln!("[{tag}] {text}");
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
