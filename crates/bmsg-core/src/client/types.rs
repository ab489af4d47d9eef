//! Client types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A registered client machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Stable machine identifier generated by the client
    pub machine_id: String,
    /// Human-readable label, usually the hostname
    pub display_label: Option<String>,
    /// Platform string reported by the client
    pub platform: Option<String>,
    /// First registration or poll
    pub first_seen: DateTime<Utc>,
    /// Most recent registration or poll
    pub last_seen: DateTime<Utc>,
}

impl Client {
    /// Time since the client was last seen
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_seen)
    }
}
