//! Typed identifier newtypes backed by UUIDs.
//!
//! Each entity gets its own id type, so a `SensorId` can never be passed
//! where a rule expects a `DeviceId`. On the wire and in storage they are
//! bare UUID strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Text that is not a valid id of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id {value:?}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident, $kind:literal) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Entity name used in error messages.
            pub const KIND: &'static str = $kind;

            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ParseIdError {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Unique identifier for a [`Sensor`](crate::sensor::Sensor).
    SensorId,
    "sensor"
);

define_id!(
    /// Unique identifier for a [`Device`](crate::device::Device).
    DeviceId,
    "device"
);

define_id!(
    /// Unique identifier for a [`Rule`](crate::rule::Rule).
    RuleId,
    "rule"
);

define_id!(
    /// Unique identifier for a stored [`Reading`](crate::reading::Reading).
    ReadingId,
    "reading"
);

define_id!(
    /// Unique identifier for an [`ExecutionRecord`](crate::execution::ExecutionRecord).
    ExecutionId,
    "execution"
);

define_id!(
    /// Unique identifier for a [`NotificationRequest`](crate::notification::NotificationRequest).
    NotificationId,
    "notification"
);
