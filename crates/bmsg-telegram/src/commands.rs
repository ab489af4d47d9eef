//! Telegram bot commands
//!
//! Argument parsing is kept in plain functions so it can be tested without
//! a bot connection.

use std::sync::Arc;

use bmsg_core::{ClientSummary, Gateway, Operator};
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::error::Result;

/// Bot state shared across commands
pub struct BotState {
    pub gateway: Arc<Gateway>,
    /// Chats allowed to act as operator; empty rejects everyone
    pub admin_chat_ids: Vec<i64>,
}

impl BotState {
    /// Operator identity for an allow-listed chat
    pub fn operator_for(&self, chat_id: i64) -> Option<Operator> {
        if self.admin_chat_ids.contains(&chat_id) {
            Some(Operator::bridge(format!("telegram:{}", chat_id)))
        } else {
            None
        }
    }
}

/// A call-to-action parsed from command arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cta {
    pub url: String,
    pub text: String,
}

/// Parse `<url> | <text>`
///
/// Without a `|` the whole argument is taken as text, which leaves the URL
/// empty and is rejected.
pub fn parse_cta(args: &str) -> std::result::Result<Cta, &'static str> {
    let (url, text) = match args.split_once('|') {
        Some((url, text)) => (url.trim(), text.trim()),
        None => ("", args.trim()),
    };
    if url.is_empty() {
        return Err("URL is required: <url> | <text>");
    }
    if url.contains(char::is_whitespace) {
        return Err("URL must not contain spaces");
    }
    Ok(Cta {
        url: url.to_string(),
        text: text.to_string(),
    })
}

/// Parse `<client_id> <url> | <text>`
pub fn parse_send(args: &str) -> std::result::Result<(String, Cta), &'static str> {
    let args = args.trim();
    let (client_id, rest) = match args.split_once(char::is_whitespace) {
        Some((client_id, rest)) if !client_id.contains('|') => (client_id, rest),
        _ => return Err("Usage: /send <client_id> <url> | <text>"),
    };
    let cta = parse_cta(rest)?;
    Ok((client_id.to_string(), cta))
}

async fn reject(bot: &Bot, msg: &Message) -> Result<()> {
    warn!("Rejected Telegram command from chat {}", msg.chat.id);
    bot.send_message(msg.chat.id, "⚠️ Not authorized to use this bot.")
        .await?;
    Ok(())
}

/// Handle /broadcast command
pub async fn handle_broadcast(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
    args: String,
) -> Result<()> {
    let Some(operator) = state.operator_for(msg.chat.id.0) else {
        return reject(&bot, &msg).await;
    };

    let cta = match parse_cta(&args) {
        Ok(cta) => cta,
        Err(usage) => {
            bot.send_message(msg.chat.id, usage).await?;
            return Ok(());
        }
    };

    let reply = match state.gateway.broadcast(&operator, &cta.url, &cta.text) {
        Ok(message) => format!("✅ Broadcast #{} queued", message.id),
        Err(e) => format!("❌ {}", e),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Handle /send command
pub async fn handle_send(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
    args: String,
) -> Result<()> {
    let Some(operator) = state.operator_for(msg.chat.id.0) else {
        return reject(&bot, &msg).await;
    };

    let (client_id, cta) = match parse_send(&args) {
        Ok(parsed) => parsed,
        Err(usage) => {
            bot.send_message(msg.chat.id, usage).await?;
            return Ok(());
        }
    };

    let reply = match state
        .gateway
        .send(&operator, &client_id, &cta.url, &cta.text)
    {
        Ok(message) => format!("✅ Message #{} queued for {}", message.id, client_id),
        Err(e) => format!("❌ {}", e),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Handle /clients command
pub async fn handle_clients(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(operator) = state.operator_for(msg.chat.id.0) else {
        return reject(&bot, &msg).await;
    };

    let clients = state.gateway.clients(&operator);
    if let Ok(clients) = &clients {
        info!("Listing {} client(s) for chat {}", clients.len(), msg.chat.id);
    }

    let reply = clients_reply(clients);
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Chat reply for a client listing
pub fn clients_reply(clients: bmsg_core::Result<Vec<ClientSummary>>) -> String {
    let clients = match clients {
        Ok(clients) => clients,
        Err(e) => return format!("❌ {}", e),
    };

    if clients.is_empty() {
        return "No clients registered yet.".to_string();
    }
    clients
        .iter()
        .map(|c| {
            format!(
                "{} ({}) last seen {} unread {}",
                c.client_id,
                c.display_label.as_deref().unwrap_or("-"),
                c.last_seen.format("%Y-%m-%d %H:%M"),
                c.unread
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Handle /help command
pub async fn handle_help(bot: Bot, msg: Message) -> Result<()> {
    let help_text = r#"📣 bmsg operator bot

/broadcast <url> | <text> - send to every client
/send <client_id> <url> | <text> - send to one client
/clients - list clients and unread counts
/help - show this message

Example:
/broadcast https://example.com/survey | Please fill in the survey"#;

    bot.send_message(msg.chat.id, help_text).await?;
    Ok(())
}
