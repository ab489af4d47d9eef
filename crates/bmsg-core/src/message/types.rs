//! Message and delivery record types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Monotonically increasing message identifier
pub type MessageId = i64;

/// Who a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every client, including ones that register later
    Broadcast,
    /// Exactly one named client
    Targeted,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Targeted => "targeted",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "targeted" => Ok(Self::Targeted),
            other => Err(Error::Validation(format!("unknown scope: {}", other))),
        }
    }
}

/// An operator-authored call-to-action; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// CTA target, never empty
    pub url: String,
    /// Display body
    pub text: String,
    pub scope: Scope,
    /// Set only for targeted messages
    pub target_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivery and read state of one message for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: MessageId,
    pub client_id: String,
    /// First successful fetch
    pub delivered_at: Option<DateTime<Utc>>,
    /// Client acknowledgement
    pub read_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Current position in the `Pending -> Delivered -> Read` state machine
    pub fn state(&self) -> DeliveryState {
        match (self.delivered_at, self.read_at) {
            (_, Some(_)) => DeliveryState::Read,
            (Some(_), None) => DeliveryState::Delivered,
            (None, None) => DeliveryState::Pending,
        }
    }
}

/// Per-record delivery state; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Read,
}
