//! Sensor service — use-cases for managing telemetry sources.
//!
//! Edits are mirrored into the [`SensorResolver`] shared with ingestion, so
//! a deactivated sensor or a newly declared range applies to the very next
//! message.

use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::SensorId;
use greenhub_domain::sensor::{FieldRange, Sensor};

use crate::discovery::SensorResolver;
use crate::ports::SensorRepository;

/// Application service for sensor CRUD operations.
pub struct SensorService<R> {
    repo: R,
    resolver: SensorResolver<R>,
}

impl<R: SensorRepository> SensorService<R> {
    pub fn new(repo: R, resolver: SensorResolver<R>) -> Self {
        Self { repo, resolver }
    }

    /// Register a sensor ahead of its first message.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail, or a
    /// storage error (e.g. duplicate hardware id) from the repository.
    #[tracing::instrument(skip(self, sensor), fields(hardware_id = %sensor.hardware_id))]
    pub async fn create_sensor(&self, sensor: Sensor) -> Result<Sensor, GreenHubError> {
        sensor.validate()?;
        self.repo.create(sensor).await
    }

    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when no sensor with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_sensor(&self, id: SensorId) -> Result<Sensor, GreenHubError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Sensor",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_sensors(&self) -> Result<Vec<Sensor>, GreenHubError> {
        self.repo.get_all().await
    }

    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, sensor), fields(sensor_id = %sensor.id))]
    pub async fn update_sensor(&self, sensor: Sensor) -> Result<Sensor, GreenHubError> {
        sensor.validate()?;
        let previous = self.get_sensor(sensor.id).await?;
        let updated = self.repo.update(sensor).await?;
        self.remember(&previous, &updated);
        Ok(updated)
    }

    /// Declare (or redeclare) the accepted range of one field.
    ///
    /// Typically used to tighten the open schema of an auto-discovered
    /// sensor.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the sensor does not exist, or
    /// [`GreenHubError::Validation`] if `min > max`.
    #[tracing::instrument(skip(self))]
    pub async fn declare_field(
        &self,
        id: SensorId,
        field: &str,
        range: FieldRange,
    ) -> Result<Sensor, GreenHubError> {
        let mut sensor = self.get_sensor(id).await?;
        sensor.schema.insert(field.to_string(), range);
        self.update_sensor(sensor).await
    }

    /// Start or stop accepting readings from a sensor.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the sensor does not exist, or
    /// a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, id: SensorId, active: bool) -> Result<Sensor, GreenHubError> {
        let previous = self.get_sensor(id).await?;
        let updated = self
            .repo
            .update(Sensor {
                active,
                ..previous.clone()
            })
            .await?;
        self.remember(&previous, &updated);
        tracing::info!(sensor_id = %id, active, "Sensor toggled");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_sensor(&self, id: SensorId) -> Result<(), GreenHubError> {
        let existing = self.repo.get_by_id(id).await?;
        self.repo.delete(id).await?;
        if let Some(sensor) = existing {
            self.resolver.forget(&sensor.hardware_id);
        }
        Ok(())
    }

    fn remember(&self, previous: &Sensor, updated: &Sensor) {
        if previous.hardware_id != updated.hardware_id {
            self.resolver.forget(&previous.hardware_id);
        }
        self.resolver.refresh(updated.clone());
    }
}
