//! Telegram bot implementation

use std::sync::Arc;

use bmsg_core::Gateway;
use teloxide::{dispatching::UpdateFilterExt, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use crate::commands::{
    BotState, handle_broadcast, handle_clients, handle_help, handle_send,
};
use crate::error::{Result, TelegramError};

/// Telegram bot commands
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "bmsg operator commands")]
pub enum Command {
    #[command(description = "Show help message")]
    Start,
    #[command(description = "Broadcast to every client: <url> | <text>")]
    Broadcast(String),
    #[command(description = "Send to one client: <client_id> <url> | <text>")]
    Send(String),
    #[command(description = "List clients with unread counts")]
    Clients,
    #[command(description = "Show help message")]
    Help,
}

/// Telegram bot wrapper
pub struct TelegramBot {
    bot: Bot,
    state: Arc<BotState>,
}

impl TelegramBot {
    /// Create a new Telegram bot
    pub fn new(token: &str, gateway: Arc<Gateway>, admin_chat_ids: Vec<i64>) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(TelegramError::TokenNotSet);
        }
        if admin_chat_ids.is_empty() {
            warn!("No Telegram admin chats configured; every operator command will be rejected");
        }

        let state = Arc::new(BotState {
            gateway,
            admin_chat_ids,
        });

        Ok(Self {
            bot: Bot::new(token),
            state,
        })
    }

    /// Run the bot until its dispatcher stops
    pub async fn start(self) -> Result<()> {
        info!("Starting Telegram bot...");

        let command_handler = Update::filter_message()
            .filter_command::<Command>()
            .endpoint(
                |bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>| async move {
                    match cmd {
                        Command::Broadcast(args) => handle_broadcast(bot, msg, state, args).await,
                        Command::Send(args) => handle_send(bot, msg, state, args).await,
                        Command::Clients => handle_clients(bot, msg, state).await,
                        Command::Start | Command::Help => handle_help(bot, msg).await,
                    }
                },
            );

        Dispatcher::builder(self.bot, command_handler)
            .dependencies(dptree::deps![self.state])
            .build()
            .dispatch()
            .await;

        info!("Telegram bot stopped");
        Ok(())
    }
}
