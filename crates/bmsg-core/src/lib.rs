//! bmsg-core: Broadcast messaging core library
//!
//! Client registry, message store, dispatch and receipt tracking for the
//! bmsg server. Everything hangs off an explicitly constructed
//! [`Database`]; there is no global state, so any number of independent
//! instances can live in one process.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod message;
pub mod receipts;

pub use auth::AdminSecret;
pub use client::{Client, ClientRegistry};
pub use config::{Config, DispatchConfig, ServerConfig, StorageConfig, TelegramConfig};
pub use db::Database;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use gateway::{ClientSummary, Gateway, Operator};
pub use message::{DeliveryRecord, DeliveryState, Message, MessageId, MessageStore, Scope};
pub use receipts::ReceiptTracker;
