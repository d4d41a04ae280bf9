// src/main.rs — chatkeep entry point

use clap::Parser;

use chatkeep::cli::{Cli, Commands};
use chatkeep::infra::config::Config;
use chatkeep::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Respects CHATKEEP_LOG / RUST_LOG
    logger::init_logging(if cli.verbose { "debug" } else { "warn" });

    // Falls back to defaults if no config.toml
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };
    let login = cli.login()?;

    match cli.command {
        None | Some(Commands::Chat) => chatkeep::cli::chat::run_chat(&config, login, cli.quiet).await,
        Some(Commands::History) => {
            chatkeep::cli::history::run_history(&config, login, cli.quiet).await
        }
        Some(Commands::Show { ref session_id }) => {
            chatkeep::cli::history::run_show(&config, login, session_id, cli.quiet).await
        }
    }
}
