//! bmsg-telegram: Telegram bridge for bmsg
//!
//! Lets allow-listed operator chats broadcast and send messages through
//! the same gateway the HTTP API uses.

pub mod bot;
pub mod commands;
pub mod error;

pub use bot::TelegramBot;
pub use commands::{BotState, Cta, parse_cta, parse_send};
pub use error::{Result, TelegramError};
