//! # greenhub-domain
//!
//! Pure domain model for the greenhub automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Sensors** (telemetry sources with a declared field schema)
//! - Define **Devices** (actuators commanded over a control topic)
//! - Define **Readings** and how raw payloads decode into them
//! - Define **Rules** (condition tree → actions, with a cooldown window)
//! - Define **Notifications** and **Execution records** (audit trail)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod device;
pub mod execution;
pub mod notification;
pub mod reading;
pub mod rule;
pub mod sensor;
