//! Cache port — latest reading per sensor.

use std::future::Future;
use std::sync::Arc;

use greenhub_domain::id::SensorId;
use greenhub_domain::reading::Reading;

/// Holds at most one reading per sensor: the last one written.
pub trait ReadingCache {
    /// Latest unexpired reading of a sensor.
    fn get(&self, sensor_id: SensorId) -> impl Future<Output = Option<Reading>> + Send;

    /// Overwrite the entry of `reading.sensor_id` and refresh its TTL.
    fn set(&self, reading: Reading) -> impl Future<Output = ()> + Send;

    /// Drop the entry of a sensor.
    fn expire(&self, sensor_id: SensorId) -> impl Future<Output = ()> + Send;
}

impl<T: ReadingCache + Send + Sync> ReadingCache for Arc<T> {
    fn get(&self, sensor_id: SensorId) -> impl Future<Output = Option<Reading>> + Send {
        self.as_ref().get(sensor_id)
    }

    fn set(&self, reading: Reading) -> impl Future<Output = ()> + Send {
        self.as_ref().set(reading)
    }

    fn expire(&self, sensor_id: SensorId) -> impl Future<Output = ()> + Send {
        self.as_ref().expire(sensor_id)
    }
}
