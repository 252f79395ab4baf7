//! Request bodies of the HTTP transports.

use serde::Serialize;

use greenhub_domain::notification::NotificationRequest;
use greenhub_domain::rule::{Priority, TargetChannel};

/// Body POSTed to the generic webhook.
///
/// Field names follow the receiver's contract.
#[derive(Debug, Serialize)]
pub struct WebhookBody<'a> {
    pub usuario: &'a str,
    pub canal: &'a str,
    #[serde(rename = "targetChannel")]
    pub target_channel: TargetChannel,
    pub mensaje: &'a str,
    pub timestamp: String,
    pub priority: Priority,
    pub source: &'a str,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> WebhookBody<'a> {
    #[must_use]
    pub fn new(request: &'a NotificationRequest, source: &'a str) -> Self {
        Self {
            usuario: &request.user,
            canal: &request.channel,
            target_channel: request.target_channel,
            mensaje: &request.message,
            timestamp: request.created_at.to_rfc3339(),
            priority: request.priority,
            source,
            metadata: &request.metadata,
        }
    }
}

/// Body of a Telegram bot API `sendMessage` call.
#[derive(Debug, Serialize)]
pub struct TelegramBody<'a> {
    pub chat_id: &'a str,
    pub text: String,
    /// Low-priority messages arrive silently.
    pub disable_notification: bool,
}

impl<'a> TelegramBody<'a> {
    #[must_use]
    pub fn new(request: &NotificationRequest, chat_id: &'a str) -> Self {
        Self {
            chat_id,
            text: format!(
                "[{}] {} ({})\n{}",
                request.priority.as_str().to_ascii_uppercase(),
                request.channel,
                request.user,
                request.message
            ),
            disable_notification: request.priority == Priority::Low,
        }
    }
}

/// Body POSTed to the e-mail relay.
#[derive(Debug, Serialize)]
pub struct EmailBody<'a> {
    pub from: &'a str,
    pub to: &'a [String],
    pub subject: String,
    pub body: &'a str,
    pub canal: &'a str,
    #[serde(rename = "targetChannel")]
    pub target_channel: TargetChannel,
    pub priority: Priority,
    pub source: &'a str,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> EmailBody<'a> {
    #[must_use]
    pub fn new(
        request: &'a NotificationRequest,
        from: &'a str,
        to: &'a [String],
        source: &'a str,
    ) -> Self {
        let topic = request
            .metadata
            .get("rule_name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("notification");
        Self {
            from,
            to,
            subject: format!("[greenhub][{}] {topic}", request.priority),
            body: &request.message,
            canal: &request.channel,
            target_channel: request.target_channel,
            priority: request.priority,
            source,
            metadata: &request.metadata,
        }
    }
}
