//! # greenhub-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `SensorRepository`, `DeviceRepository`, `ReadingRepository`,
//!     `RuleRepository` — persistence
//!   - `ExecutionLog` — audit trail of rule evaluations and action outcomes
//!   - `ReadingCache` — latest reading per sensor
//!   - `DeviceCommandPublisher` — device control output
//!   - `NotificationTransport` — notification delivery
//! - Run the telemetry pipeline: [`ingestion`] → [`discovery`] → [`cache`] →
//!   [`rule_engine`] → [`action_queue`] → [`executor`] → [`notification`]
//! - Provide CRUD [`services`] with validation for sensors, devices and rules
//!
//! ## Dependency rule
//! Depends on `greenhub-domain` only (plus `tokio` for tasks, timers and
//! channels). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod action_queue;
pub mod cache;
pub mod discovery;
pub mod executor;
pub mod ingestion;
pub mod notification;
pub mod ports;
pub mod rule_engine;
pub mod services;

#[cfg(test)]
mod testing;
