//! # greenhub-adapter-notify-http
//!
//! Notification transports over HTTP.
//!
//! ## Responsibilities
//! - Implement the `NotificationTransport` port defined in `greenhub-app`
//! - Shape the request body each receiver expects (webhook, Telegram bot
//!   API, e-mail relay)
//! - Classify failures as retryable (timeouts, connection errors, 5xx) or
//!   final (4xx)
//!
//! Retries and backoff are the dispatcher's job; this crate makes exactly one
//! HTTP request per delivery attempt.

pub mod config;
pub mod error;
pub mod payload;
pub mod transport;

pub use config::{EmailConfig, NotifyConfig, TelegramConfig, WebhookConfig};
pub use error::NotifyError;
pub use transport::HttpNotifier;
