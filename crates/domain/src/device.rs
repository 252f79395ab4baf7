//! Device — an actuator that accepts commands on a control topic.

use serde::{Deserialize, Serialize};

use crate::error::{GreenHubError, ValidationError};
use crate::id::DeviceId;
use crate::sensor::HardwareId;

/// A controllable device (pump, valve, light, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub hardware_id: HardwareId,
    pub name: String,
    /// Topic the device listens on for command payloads.
    pub control_topic: String,
    pub active: bool,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `control_topic` is empty ([`ValidationError::EmptyControlTopic`])
    pub fn validate(&self) -> Result<(), GreenHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.control_topic.trim().is_empty() {
            return Err(ValidationError::EmptyControlTopic.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    hardware_id: Option<String>,
    name: Option<String>,
    control_topic: Option<String>,
    active: Option<bool>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = Some(hardware_id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn control_topic(mut self, topic: impl Into<String>) -> Self {
        self.control_topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if the hardware id is invalid or
    /// required fields are missing.
    pub fn build(self) -> Result<Device, GreenHubError> {
        let device = Device {
            id: self.id.unwrap_or_default(),
            hardware_id: HardwareId::new(self.hardware_id.unwrap_or_default())?,
            name: self.name.unwrap_or_default(),
            control_topic: self.control_topic.unwrap_or_default(),
            active: self.active.unwrap_or(true),
        };
        device.validate()?;
        Ok(device)
    }
}
