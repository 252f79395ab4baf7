//! Storage port — repository traits for persistence.

use std::future::Future;

use greenhub_domain::device::Device;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::{DeviceId, RuleId, SensorId};
use greenhub_domain::reading::Reading;
use greenhub_domain::rule::Rule;
use greenhub_domain::sensor::{HardwareId, Sensor};
use greenhub_domain::time::Timestamp;

/// Repository for persisting and querying [`Sensor`]s.
pub trait SensorRepository {
    /// Create a new sensor in storage.
    fn create(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send;

    /// Insert `sensor` unless one with the same hardware id exists.
    ///
    /// Returns the stored record, which is the pre-existing one when the
    /// hardware id was already known. Must be atomic: concurrent calls for the
    /// same hardware id yield a single record.
    fn insert_if_absent(
        &self,
        sensor: Sensor,
    ) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send;

    /// Get a sensor by its unique identifier.
    fn get_by_id(
        &self,
        id: SensorId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send;

    /// Find a sensor by hardware id.
    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send;

    /// Get all sensors.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Sensor>, GreenHubError>> + Send;

    /// Update an existing sensor.
    fn update(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send;

    /// Delete a sensor by its unique identifier.
    fn delete(&self, id: SensorId) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}

/// Repository for persisting and querying [`Device`]s.
pub trait DeviceRepository {
    /// Create a new device in storage.
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send;

    /// Get a device by its unique identifier.
    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send;

    /// Find a device by hardware id.
    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send;

    /// Get all devices.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, GreenHubError>> + Send;

    /// Update an existing device.
    fn update(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send;

    /// Delete a device by its unique identifier.
    fn delete(&self, id: DeviceId) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}

/// Append-only store of decoded [`Reading`]s.
pub trait ReadingRepository {
    /// Persist a reading.
    fn insert(&self, reading: Reading) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Most recent readings of a sensor, newest first.
    fn latest_for_sensor(
        &self,
        sensor_id: SensorId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Reading>, GreenHubError>> + Send;
}

/// Repository for persisting and querying [`Rule`]s.
pub trait RuleRepository {
    /// Create a new rule in storage.
    fn create(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send;

    /// Get a rule by its unique identifier.
    fn get_by_id(&self, id: RuleId)
    -> impl Future<Output = Result<Option<Rule>, GreenHubError>> + Send;

    /// Get all rules.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send;

    /// Get all enabled rules.
    fn get_enabled(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send;

    /// Update an existing rule.
    fn update(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send;

    /// Persist the time a rule last fired.
    fn record_trigger(
        &self,
        id: RuleId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Delete a rule by its unique identifier.
    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}
