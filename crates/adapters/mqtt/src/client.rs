//! Broker connection: telemetry in, device commands out.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};

use greenhub_app::ports::DeviceCommandPublisher;
use greenhub_domain::error::GreenHubError;

use crate::config::MqttConfig;
use crate::error::MqttError;

/// Create the client pair for a broker.
///
/// Nothing is sent until [`TelemetryListener::run`] drives the connection.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttCommandPublisher, TelemetryListener) {
    let (client, eventloop) = AsyncClient::new(config.options(), config.request_capacity.max(1));
    let publisher = MqttCommandPublisher {
        client: client.clone(),
    };
    let listener = TelemetryListener {
        client,
        eventloop,
        topics: config.telemetry_topics.clone(),
        reconnect_delay: config.reconnect_delay(),
    };
    (publisher, listener)
}

/// Encode a command payload for the wire.
///
/// # Errors
///
/// Returns [`MqttError::Encode`] if the value cannot be serialized.
pub fn encode_command(payload: &serde_json::Value) -> Result<Vec<u8>, MqttError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Publishes device commands with QoS "at least once".
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
}

impl DeviceCommandPublisher for MqttCommandPublisher {
    fn publish(
        &self,
        topic: String,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let client = self.client.clone();
        async move {
            let bytes = encode_command(&payload)?;
            client
                .publish(topic.as_str(), QoS::AtLeastOnce, false, bytes)
                .await
                .map_err(MqttError::from)?;
            tracing::debug!(topic = %topic, "Device command queued");
            Ok(())
        }
    }
}

/// Drives the broker connection and forwards telemetry messages.
pub struct TelemetryListener {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Vec<String>,
    reconnect_delay: Duration,
}

impl TelemetryListener {
    /// Poll the connection until `shutdown` resolves.
    ///
    /// Subscriptions are (re)issued on every connection acknowledgement.
    /// Connection errors are logged and retried after the reconnect delay;
    /// rumqttc reconnects on the next poll.
    pub async fn run<F, S>(mut self, mut on_message: F, shutdown: S)
    where
        F: FnMut(&str, Vec<u8>),
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Connected to MQTT broker");
                        self.subscribe();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        on_message(&publish.topic, publish.payload.to_vec());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            retry_in_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                            "MQTT connection error"
                        );
                        tokio::time::sleep(self.reconnect_delay).await;
                    }
                },
            }
        }
        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(error = %err, "MQTT disconnect request not sent");
        }
        tracing::info!("MQTT listener stopped");
    }

    // Non-blocking: the request channel is drained by this same loop.
    fn subscribe(&self) {
        for topic in &self.topics {
            match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => tracing::info!(topic = %topic, "Subscribed to telemetry"),
                Err(err) => tracing::warn!(topic = %topic, error = %err, "Failed to subscribe"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_encode_state_command_as_json() {
        let bytes = encode_command(&serde_json::json!({ "state": true })).unwrap();
        assert_eq!(bytes, br#"{"state":true}"#);
    }

    #[tokio::test]
    async fn should_queue_command_without_broker_round_trip() {
        let (publisher, _listener) = connect(&MqttConfig::default());

        let result = publisher
            .publish(
                "greenhub/devices/pump-1/set".to_string(),
                serde_json::json!({ "state": false }),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_fail_publish_once_listener_is_gone() {
        let (publisher, listener) = connect(&MqttConfig::default());
        drop(listener);

        let result = publisher
            .publish("greenhub/devices/pump-1/set".to_string(), serde_json::json!({ "state": true }))
            .await;

        assert!(matches!(result, Err(GreenHubError::Transport(_))));
    }
}
