//! Message store module
//!
//! Messages plus per-(message, client) delivery records.

mod store;
mod types;

pub use store::MessageStore;
pub use types::{DeliveryRecord, DeliveryState, Message, MessageId, Scope};
