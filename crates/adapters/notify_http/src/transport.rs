//! [`NotificationTransport`] over HTTP.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url, header};

use greenhub_app::ports::{NotificationTransport, TransportError};
use greenhub_domain::notification::{NotificationRequest, TransportKind};

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::payload::{EmailBody, TelegramBody, WebhookBody};

/// Longest receiver error text kept in a [`TransportError::Rejected`].
const MAX_REASON_LEN: usize = 200;

/// Webhook, Telegram and e-mail delivery over one shared HTTP client.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    config: NotifyConfig,
}

impl HttpNotifier {
    /// Build the HTTP client and check the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidEndpoint`] if an endpoint is not a URL,
    /// or [`NotifyError::Client`] if the client cannot be built.
    pub fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        if let Some(webhook) = &config.webhook {
            check_url("webhook", &webhook.url)?;
        }
        if let Some(telegram) = &config.telegram {
            check_url("telegram", &telegram.send_message_url())?;
        }
        if let Some(email) = &config.email {
            check_url("email", &email.relay_url)?;
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    fn request(
        &self,
        kind: TransportKind,
        request: &NotificationRequest,
    ) -> Result<RequestBuilder, TransportError> {
        let source = self.config.source.as_str();
        match kind {
            TransportKind::Webhook => {
                let webhook = self
                    .config
                    .webhook
                    .as_ref()
                    .ok_or(TransportError::NotConfigured(kind))?;
                let mut builder = self
                    .client
                    .post(&webhook.url)
                    .json(&WebhookBody::new(request, source));
                if let Some(token) = &webhook.bearer_token {
                    builder = builder.bearer_auth(token);
                }
                Ok(builder)
            }
            TransportKind::Telegram => {
                let telegram = self
                    .config
                    .telegram
                    .as_ref()
                    .ok_or(TransportError::NotConfigured(kind))?;
                Ok(self
                    .client
                    .post(telegram.send_message_url())
                    .json(&TelegramBody::new(request, &telegram.chat_id)))
            }
            TransportKind::Email => {
                let email = self
                    .config
                    .email
                    .as_ref()
                    .ok_or(TransportError::NotConfigured(kind))?;
                let mut builder = self.client.post(&email.relay_url).json(&EmailBody::new(
                    request,
                    &email.from,
                    &email.to,
                    source,
                ));
                if let Some(key) = &email.api_key {
                    builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
                }
                Ok(builder)
            }
        }
    }
}

fn check_url(transport: &'static str, url: &str) -> Result<(), NotifyError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|_| NotifyError::InvalidEndpoint {
            transport,
            url: url.to_string(),
        })
}

fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Unavailable(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TransportError::Unavailable(format!("status {status}")));
    }
    let mut reason = response.text().await.unwrap_or_default();
    if reason.len() > MAX_REASON_LEN {
        let mut end = MAX_REASON_LEN;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    Err(TransportError::Rejected {
        status: status.as_u16(),
        reason,
    })
}

impl NotificationTransport for HttpNotifier {
    fn available(&self) -> Vec<TransportKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.config.webhook.is_some() {
            kinds.push(TransportKind::Webhook);
        }
        if self.config.telegram.is_some() {
            kinds.push(TransportKind::Telegram);
        }
        if self.config.email.is_some() {
            kinds.push(TransportKind::Email);
        }
        kinds
    }

    fn deliver(
        &self,
        kind: TransportKind,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let prepared = self.request(kind, request);
        let notification_id = request.id;
        async move {
            let response = prepared?.send().await.map_err(|err| classify(&err))?;
            check_status(response).await?;
            tracing::debug!(transport = %kind, %notification_id, "Notification accepted");
            Ok(())
        }
    }
}
