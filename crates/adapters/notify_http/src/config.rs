//! Endpoints of the HTTP notification transports.

use serde::Deserialize;

/// Settings shared by every HTTP transport, plus one optional section per
/// transport. A transport without a section is not available.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Value of the `source` field sent to receivers.
    pub source: String,
    pub webhook: Option<WebhookConfig>,
    pub telegram: Option<TelegramConfig>,
    pub email: Option<EmailConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            source: "greenhub-engine".to_string(),
            webhook: None,
            telegram: None,
            email: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "TelegramConfig::default_api_base")]
    pub api_base: String,
}

impl TelegramConfig {
    fn default_api_base() -> String {
        "https://api.telegram.org".to_string()
    }

    /// `sendMessage` endpoint of the configured bot.
    #[must_use]
    pub fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

/// An HTTP mail relay accepting one JSON message per request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub relay_url: String,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}
