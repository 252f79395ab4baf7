//! Action — what a rule does once its condition matches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::DeviceId;

/// A single action. The set of kinds is closed; unknown `type` tags fail to
/// deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Publish a command to a device's control topic.
    DeviceControl {
        device_id: DeviceId,
        command: DeviceCommand,
    },
    /// Render `template` and send it through the notification dispatcher.
    ///
    /// Unset optional fields are filled in by the executor's defaults.
    Notify {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(
            default,
            alias = "targetChannel",
            skip_serializing_if = "Option::is_none"
        )]
        target_channel: Option<TargetChannel>,
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<Priority>,
    },
}

impl Action {
    #[must_use]
    pub fn notify(template: impl Into<String>) -> Self {
        Self::Notify {
            channel: None,
            target_channel: None,
            template: template.into(),
            priority: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::DeviceControl { .. } => ActionKind::DeviceControl,
            Self::Notify { .. } => ActionKind::Notify,
        }
    }

    /// Device this action commands, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::DeviceControl { device_id, .. } => Some(*device_id),
            Self::Notify { .. } => None,
        }
    }

    /// Check action-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTemplate`] for a notification without
    /// message text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::DeviceControl { .. } => Ok(()),
            Self::Notify { template, .. } if template.trim().is_empty() => {
                Err(ValidationError::EmptyTemplate)
            }
            Self::Notify { .. } => Ok(()),
        }
    }
}

/// Discriminant of [`Action`], used in execution outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    DeviceControl,
    Notify,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeviceControl => "DEVICE_CONTROL",
            Self::Notify => "NOTIFY",
        })
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEVICE_CONTROL" => Ok(Self::DeviceControl),
            "NOTIFY" => Ok(Self::Notify),
            other => Err(format!("unknown action kind {other:?}")),
        }
    }
}

/// Command sent to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    /// Arbitrary state value understood by the device firmware.
    Set { state: serde_json::Value },
}

impl DeviceCommand {
    /// Wire payload published on the control topic.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let state = match self {
            Self::TurnOn => serde_json::Value::Bool(true),
            Self::TurnOff => serde_json::Value::Bool(false),
            Self::Set { state } => state.clone(),
        };
        serde_json::json!({ "state": state })
    }
}

/// Urgency of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery transport selected for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetChannel {
    Webhook,
    Telegram,
    Email,
    /// Every configured transport.
    All,
}

impl TargetChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Telegram => "telegram",
            Self::Email => "email",
            Self::All => "all",
        }
    }
}

impl fmt::Display for TargetChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(Self::Webhook),
            "telegram" => Ok(Self::Telegram),
            "email" => Ok(Self::Email),
            "all" => Ok(Self::All),
            other => Err(format!("unknown target channel {other:?}")),
        }
    }
}
