//! bmsg-server: broadcast message server binary
//!
//! Usage:
//!   bmsg-server            - Start the HTTP API (and Telegram bot if configured)
//!   bmsg-server --help     - Show help

mod args;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bmsg_core::{Config, Gateway};
use bmsg_telegram::TelegramBot;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use crate::args::{Args, RunMode, print_help};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;

    match args.mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("bmsg-server {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    args.apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    run_server(config, args.no_bot).await
}

/// Run the HTTP API and, when configured, the Telegram bot
async fn run_server(config: Config, no_bot: bool) -> anyhow::Result<()> {
    tracing::info!("Starting bmsg-server...");
    if config.uses_default_secret() {
        tracing::warn!(
            "Admin secret is the shipped default; set BMSG_ADMIN_SECRET or --secret"
        );
    }

    let gateway = Arc::new(
        Gateway::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?,
    );
    tracing::info!("Database: {}", config.storage.db_path);

    let mut bot_handle = None;
    match &config.telegram.token {
        Some(token) if !no_bot => {
            let bot = TelegramBot::new(
                token,
                Arc::clone(&gateway),
                config.telegram.admin_chat_ids.clone(),
            )?;
            bot_handle = Some(tokio::spawn(async move {
                if let Err(e) = bot.start().await {
                    tracing::error!("Telegram bot error: {}", e);
                }
            }));
            tracing::info!("Telegram bot started");
        }
        Some(_) => tracing::info!("Telegram bot disabled (--no-bot)"),
        None => tracing::info!("Telegram bot disabled (no token configured)"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut api = tokio::spawn(bmsg_api::start_server(
        addr,
        gateway,
        config.server.allowed_origins.clone(),
        async move {
            shutdown_rx.await.ok();
        },
    ));

    tracing::info!("bmsg-server initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down...");
        }
        // only ends early on a bind or serve failure
        result = &mut api => {
            if let Some(handle) = &bot_handle {
                handle.abort();
            }
            return result?;
        }
    }

    if let Some(handle) = bot_handle {
        handle.abort();
    }
    shutdown_tx.send(()).ok();
    api.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
