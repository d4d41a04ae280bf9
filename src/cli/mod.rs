// src/cli/mod.rs — CLI definition (clap derive)

pub mod chat;
pub mod history;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chatkeep",
    about = "Terminal chat client that keeps your conversation history",
    version
)]
pub struct Cli {
    /// User id to log in as
    #[arg(short, long, env = "CHATKEEP_USER", global = true)]
    pub user: Option<String>,

    /// Bearer token for the chat backend (omit to chat without saving)
    #[arg(long, env = "CHATKEEP_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// List your past conversations
    History,
    /// Print every message of one past conversation
    Show {
        /// Session id as listed by `history`
        session_id: String,
    },
}

/// Credentials handed over by the auth layer.
#[derive(Debug, Clone)]
pub struct Login {
    pub user_id: String,
    pub token: Option<String>,
}

impl Cli {
    pub fn login(&self) -> anyhow::Result<Login> {
        let user_id = self
            .user
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("no user id: pass --user or set CHATKEEP_USER"))?;
        Ok(Login {
            user_id,
            token: self.token.clone().filter(|t| !t.is_empty()),
        })
    }
}
