//! Device service — use-cases for managing actuators.

use greenhub_domain::device::Device;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::DeviceId;

use crate::ports::DeviceRepository;

/// Application service for device CRUD operations.
pub struct DeviceService<R> {
    repo: R,
}

impl<R: DeviceRepository> DeviceService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Create a new device after validating domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, device), fields(hardware_id = %device.hardware_id))]
    pub async fn create_device(&self, device: Device) -> Result<Device, GreenHubError> {
        device.validate()?;
        self.repo.create(device).await
    }

    /// Look up a device by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when no device with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_device(&self, id: DeviceId) -> Result<Device, GreenHubError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all devices.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_devices(&self) -> Result<Vec<Device>, GreenHubError> {
        self.repo.get_all().await
    }

    /// Update an existing device.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    pub async fn update_device(&self, device: Device) -> Result<Device, GreenHubError> {
        device.validate()?;
        self.repo.update(device).await
    }

    /// Create or update a device keyed by its hardware id.
    ///
    /// An existing device keeps its id; name, control topic and active flag
    /// are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, device), fields(hardware_id = %device.hardware_id))]
    pub async fn register_device(&self, device: Device) -> Result<Device, GreenHubError> {
        match self.repo.find_by_hardware_id(&device.hardware_id).await? {
            Some(existing) => {
                self.update_device(Device {
                    id: existing.id,
                    ..device
                })
                .await
            }
            None => self.create_device(device).await,
        }
    }

    /// Enable or disable command delivery to a device.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the device does not exist, or
    /// a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, id: DeviceId, active: bool) -> Result<Device, GreenHubError> {
        let device = self.get_device(id).await?;
        self.repo.update(Device { active, ..device }).await
    }

    /// Delete a device by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_device(&self, id: DeviceId) -> Result<(), GreenHubError> {
        self.repo.delete(id).await
    }
}
