//! Reading — one decoded telemetry sample of a sensor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::id::{ReadingId, SensorId};
use crate::sensor::FieldSchema;
use crate::time::Timestamp;

/// A raw telemetry payload that parsed as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(serde_json::Map<String, serde_json::Value>);

impl Payload {
    /// Parse raw bytes into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidJson`] or [`DecodeError::NotAnObject`].
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice(bytes).map_err(DecodeError::InvalidJson)? {
            serde_json::Value::Object(map) => Ok(Self(map)),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    /// Names of the fields carrying a numeric value, in key order.
    pub fn numeric_fields(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, value)| numeric_value(value).is_some())
            .map(|(key, _)| key.as_str())
    }
}

/// Numbers and numeric strings (`"6.2"`) are accepted.
fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A sensor's field values at receipt time. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub sensor_id: SensorId,
    pub fields: BTreeMap<String, f64>,
    pub received_at: Timestamp,
}

impl Reading {
    #[must_use]
    pub fn new(sensor_id: SensorId, fields: BTreeMap<String, f64>, received_at: Timestamp) -> Self {
        Self {
            id: ReadingId::new(),
            sensor_id,
            fields,
            received_at,
        }
    }

    /// Decode a payload against the sensor's declared schema.
    ///
    /// Declared fields must hold finite numbers. Undeclared numeric fields
    /// are kept; undeclared non-numeric fields (labels, status strings) are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when a declared field is not numeric, a value
    /// is not finite, or no numeric field remains.
    pub fn decode(
        sensor_id: SensorId,
        schema: &FieldSchema,
        payload: &Payload,
        received_at: Timestamp,
    ) -> Result<Self, DecodeError> {
        let mut fields = BTreeMap::new();
        for (key, value) in &payload.0 {
            match numeric_value(value) {
                Some(number) if number.is_finite() => {
                    fields.insert(key.clone(), number);
                }
                Some(_) => return Err(DecodeError::NonFinite { field: key.clone() }),
                None if schema.contains_key(key) => {
                    return Err(DecodeError::NonNumeric { field: key.clone() });
                }
                None => {}
            }
        }
        if fields.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self::new(sensor_id, fields, received_at))
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    /// Fields whose value falls outside the range declared in `schema`.
    #[must_use]
    pub fn out_of_range<'a>(&'a self, schema: &FieldSchema) -> Vec<&'a str> {
        self.fields
            .iter()
            .filter(|(field, value)| {
                schema
                    .get(field.as_str())
                    .is_some_and(|range| !range.contains(**value))
            })
            .map(|(field, _)| field.as_str())
            .collect()
    }
}
