//! Notification — a rendered message on its way to one or more transports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::id::{NotificationId, RuleId};
use crate::rule::{Priority, TargetChannel};
use crate::time::Timestamp;

/// A concrete delivery transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Webhook,
    Telegram,
    Email,
}

impl TransportKind {
    pub const ALL: [Self; 3] = [Self::Webhook, Self::Telegram, Self::Email];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Telegram => "telegram",
            Self::Email => "email",
        }
    }

    /// The transports selected by a target channel.
    ///
    /// [`TargetChannel::All`] selects every member of `available`.
    #[must_use]
    pub fn selected_by(target: TargetChannel, available: &[Self]) -> Vec<Self> {
        match target {
            TargetChannel::Webhook => vec![Self::Webhook],
            TargetChannel::Telegram => vec![Self::Telegram],
            TargetChannel::Email => vec![Self::Email],
            TargetChannel::All => available.to_vec(),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown transport {s:?}"))
    }
}

/// A fully normalized notification: every optional field of the originating
/// action has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: NotificationId,
    pub rule_id: RuleId,
    pub message: String,
    pub priority: Priority,
    /// Logical audience (e.g. `"telegram"`), forwarded to the receiver.
    pub channel: String,
    /// Transport(s) used for delivery.
    pub target_channel: TargetChannel,
    pub user: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: Timestamp,
}
