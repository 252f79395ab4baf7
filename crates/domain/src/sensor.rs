//! Sensor — an identity that publishes telemetry on a topic.
//!
//! Sensors are either registered manually or auto-discovered the first
//! time telemetry arrives on a previously unseen topic. The
//! [`HardwareId`] derived from the topic is the natural key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GreenHubError, ValidationError};
use crate::id::SensorId;
use crate::time::Timestamp;

/// Topic segments that announce that the next segment names the sensor.
const MARKER_SEGMENTS: &[&str] = &["sensors", "sensor", "devices", "device"];

/// Topic segments describing the message kind rather than its source.
const KIND_SEGMENTS: &[&str] = &["telemetry", "data", "state", "readings", "status"];

const MAX_HARDWARE_ID_LEN: usize = 128;

/// Stable natural key of a sensor or device, unique per record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareId(String);

impl HardwareId {
    /// Validate and normalise a raw identifier (trimmed, lower-cased).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidHardwareId`] if the value is empty,
    /// too long, or contains characters outside `[a-z0-9_.:-]`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = raw.as_ref().trim().to_ascii_lowercase();
        let valid = !value.is_empty()
            && value.len() <= MAX_HARDWARE_ID_LEN
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
        if valid {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidHardwareId(raw.as_ref().to_string()))
        }
    }

    /// Derive the hardware id encoded in a telemetry topic.
    ///
    /// The segment following `sensors`/`devices` wins; otherwise the last
    /// segment that is not a message-kind suffix (`telemetry`, `data`, …).
    /// The same topic always yields the same id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopic`] if no segment qualifies.
    pub fn from_topic(topic: &str) -> Result<Self, ValidationError> {
        let segments: Vec<&str> = topic
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let after_marker = segments
            .iter()
            .position(|s| is_one_of(s, MARKER_SEGMENTS))
            .and_then(|idx| {
                segments[idx + 1..]
                    .iter()
                    .find(|s| !is_one_of(s, KIND_SEGMENTS))
            });
        let candidate = after_marker.or_else(|| {
            segments
                .iter()
                .rev()
                .find(|s| !is_one_of(s, KIND_SEGMENTS))
        });

        candidate
            .and_then(|segment| Self::new(segment).ok())
            .ok_or_else(|| ValidationError::InvalidTopic(topic.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_one_of(segment: &str, set: &[&str]) -> bool {
    set.iter().any(|known| known.eq_ignore_ascii_case(segment))
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HardwareId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HardwareId> for String {
    fn from(value: HardwareId) -> Self {
        value.0
    }
}

/// Declared bounds of a numeric field. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// An open range accepting any value.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Field name → declared range.
pub type FieldSchema = BTreeMap<String, FieldRange>;

/// How a sensor record came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorOrigin {
    Manual,
    AutoDiscovered,
}

impl fmt::Display for SensorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::AutoDiscovered => f.write_str("auto_discovered"),
        }
    }
}

impl std::str::FromStr for SensorOrigin {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto_discovered" => Ok(Self::AutoDiscovered),
            other => Err(ValidationError::InvalidOrigin(other.to_string())),
        }
    }
}

/// A telemetry source with a declared field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub hardware_id: HardwareId,
    pub topic: String,
    pub schema: FieldSchema,
    pub active: bool,
    pub origin: SensorOrigin,
    pub created_at: Timestamp,
}

impl Sensor {
    /// Create a builder for constructing a [`Sensor`].
    #[must_use]
    pub fn builder() -> SensorBuilder {
        SensorBuilder::default()
    }

    /// Build the record created on first sight of `topic`.
    ///
    /// The schema lists the fields seen in the first payload with open ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopic`] if no hardware id can be
    /// derived from the topic.
    pub fn discovered<'a>(
        topic: &str,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ValidationError> {
        let hardware_id = HardwareId::from_topic(topic)?;
        Ok(Self {
            id: SensorId::new(),
            hardware_id,
            topic: topic.to_string(),
            schema: fields
                .into_iter()
                .map(|f| (f.to_string(), FieldRange::unbounded()))
                .collect(),
            active: true,
            origin: SensorOrigin::AutoDiscovered,
            created_at: crate::time::now(),
        })
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] when a declared range has
    /// `min > max`.
    pub fn validate(&self) -> Result<(), GreenHubError> {
        for (field, range) in &self.schema {
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    return Err(ValidationError::InvalidRange {
                        field: field.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Sensor`].
#[derive(Debug, Default)]
pub struct SensorBuilder {
    id: Option<SensorId>,
    hardware_id: Option<String>,
    topic: Option<String>,
    schema: FieldSchema,
    active: Option<bool>,
    origin: Option<SensorOrigin>,
    created_at: Option<Timestamp>,
}

impl SensorBuilder {
    #[must_use]
    pub fn id(mut self, id: SensorId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = Some(hardware_id.into());
        self
    }

    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, range: FieldRange) -> Self {
        self.schema.insert(name.into(), range);
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: SensorOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`Sensor`].
    ///
    /// The hardware id defaults to the one derived from the topic.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if neither a valid hardware id
    /// nor a usable topic is provided, or if a range is inverted.
    pub fn build(self) -> Result<Sensor, GreenHubError> {
        let topic = self.topic.unwrap_or_default();
        let hardware_id = match self.hardware_id {
            Some(raw) => HardwareId::new(raw)?,
            None => HardwareId::from_topic(&topic)?,
        };
        let sensor = Sensor {
            id: self.id.unwrap_or_default(),
            hardware_id,
            topic,
            schema: self.schema,
            active: self.active.unwrap_or(true),
            origin: self.origin.unwrap_or(SensorOrigin::Manual),
            created_at: self.created_at.unwrap_or_else(crate::time::now),
        };
        sensor.validate()?;
        Ok(sensor)
    }
}
