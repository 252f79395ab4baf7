//! # greenhub-adapter-mqtt
//!
//! MQTT adapter — the transport between greenhub and the field.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker and keep the connection alive
//! - Subscribe to telemetry topic filters and hand every message to the
//!   ingestion router
//! - Publish device commands (`DeviceCommandPublisher` port)
//!
//! ## Dependency rule
//! Same as other adapters: depends on `greenhub-app` and `greenhub-domain`.

pub mod client;
pub mod config;
pub mod error;

pub use client::{MqttCommandPublisher, TelemetryListener, connect};
pub use config::MqttConfig;
pub use error::MqttError;
