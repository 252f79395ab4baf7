//! Device control port — outbound command channel to actuators.

use std::future::Future;

use greenhub_domain::error::GreenHubError;

/// Publishes command payloads on a device's control topic.
pub trait DeviceCommandPublisher {
    /// Publish `payload` on `topic` with at-least-once delivery.
    fn publish(
        &self,
        topic: String,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;
}
