//! Ragbot Chat
//!
//! Entry point: serve the chat page, chat in the terminal, or ask once.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::io::BufReader;

use ragbot_chat::config::{AppConfig, Command};
use ragbot_chat::{ChatWidget, RagbotClient, server, telemetry, terminal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before clap reads the environment
    let _ = dotenv();

    let (config, cli) = AppConfig::load().context("Configuration error")?;
    telemetry::init(&config.logging);

    let config = Arc::new(config);

    match cli.command.unwrap_or(Command::Chat) {
        Command::Serve { .. } => server::start_server(config).await,
        Command::Chat => {
            let widget = terminal_widget(&config)?;
            terminal::run_chat(
                &widget,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
            Ok(())
        }
        Command::Ask { question } => {
            let widget = terminal_widget(&config)?;
            terminal::ask_once(&widget, question.join(" "), tokio::io::stdout()).await?;
            Ok(())
        }
    }
}

fn terminal_widget(config: &AppConfig) -> anyhow::Result<ChatWidget> {
    let client = RagbotClient::from_config(&config.backend)
        .with_context(|| format!("Invalid backend URL: {}", config.backend.base_url))?;
    Ok(ChatWidget::new(Arc::new(client)))
}
