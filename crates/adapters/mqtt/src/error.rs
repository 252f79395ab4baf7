//! MQTT adapter error types.

use greenhub_domain::error::GreenHubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected a request (its event loop is gone or its
    /// request channel is full).
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),

    /// The connection to the broker failed.
    #[error("MQTT connection error")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Failed to encode an outgoing payload.
    #[error("failed to encode MQTT payload")]
    Encode(#[from] serde_json::Error),
}

impl From<MqttError> for GreenHubError {
    fn from(err: MqttError) -> Self {
        Self::Transport(Box::new(err))
    }
}
