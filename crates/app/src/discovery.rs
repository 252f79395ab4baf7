//! Auto-discovery resolver — maps inbound topics to sensor identities.
//!
//! A topic seen for the first time registers a new sensor whose schema is
//! taken from the fields of that first payload. Registration goes through
//! [`SensorRepository::insert_if_absent`], so concurrent first-sight messages
//! for the same hardware id converge on one record.
//!
//! Clones of a resolver share one memo, so the sensor service can keep the
//! ingestion path in step with edits.

use std::sync::Arc;

use dashmap::DashMap;

use greenhub_domain::error::GreenHubError;
use greenhub_domain::reading::Payload;
use greenhub_domain::sensor::{HardwareId, Sensor};

use crate::ports::SensorRepository;

/// Resolves topics to [`Sensor`]s, remembering what it has resolved.
pub struct SensorResolver<R> {
    repo: R,
    resolved: Arc<DashMap<HardwareId, Sensor>>,
}

impl<R: Clone> Clone for SensorResolver<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            resolved: Arc::clone(&self.resolved),
        }
    }
}

impl<R: SensorRepository> SensorResolver<R> {
    /// Create a new resolver backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            resolved: Arc::new(DashMap::new()),
        }
    }

    /// Return the sensor behind `topic`, registering it on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if no hardware id can be derived
    /// from the topic, or a storage error from the repository.
    pub async fn resolve(&self, topic: &str, payload: &Payload) -> Result<Sensor, GreenHubError> {
        let hardware_id = HardwareId::from_topic(topic)?;
        if let Some(known) = self.resolved.get(&hardware_id) {
            return Ok(known.clone());
        }

        let sensor = match self.repo.find_by_hardware_id(&hardware_id).await? {
            Some(existing) => existing,
            None => {
                let candidate = Sensor::discovered(topic, payload.numeric_fields())?;
                let candidate_id = candidate.id;
                let stored = self.repo.insert_if_absent(candidate).await?;
                if stored.id == candidate_id {
                    tracing::info!(
                        sensor_id = %stored.id,
                        hardware_id = %stored.hardware_id,
                        topic,
                        fields = ?stored.schema.keys().collect::<Vec<_>>(),
                        "Discovered new sensor"
                    );
                }
                stored
            }
        };

        // An edit that landed meanwhile wins over what storage returned.
        let remembered = self.resolved.entry(hardware_id).or_insert(sensor);
        Ok(remembered.value().clone())
    }

    /// Replace the remembered identity of a sensor after it was edited.
    pub fn refresh(&self, sensor: Sensor) {
        tracing::debug!(sensor_id = %sensor.id, active = sensor.active, "Sensor refreshed");
        self.resolved.insert(sensor.hardware_id.clone(), sensor);
    }

    /// Forget a sensor; the next message for it consults storage again.
    pub fn forget(&self, hardware_id: &HardwareId) {
        if self.resolved.remove(hardware_id).is_some() {
            tracing::debug!(%hardware_id, "Sensor forgotten");
        }
    }

    /// Number of identities held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
