//! Notification dispatcher — routes requests to transports with retries.

use std::time::{Duration, Instant};

use greenhub_domain::notification::{NotificationRequest, TransportKind};

use crate::ports::{NotificationTransport, TransportError};

/// Attempt budget and backoff schedule of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per transport, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline of each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): the initial backoff
    /// doubled per retry, capped at `max_backoff`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Result of delivering a request over one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub transport: TransportKind,
    pub attempts: u32,
    pub latency_ms: u64,
    pub error: Option<TransportError>,
}

impl Delivery {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends [`NotificationRequest`]s over the transports their target selects.
pub struct NotificationDispatcher<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: NotificationTransport + Send + Sync> NotificationDispatcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Transports with an endpoint configured.
    #[must_use]
    pub fn available(&self) -> Vec<TransportKind> {
        self.transport.available()
    }

    /// Deliver over every transport selected by `request.target_channel`.
    ///
    /// Returns one [`Delivery`] per selected transport; an empty list means
    /// the target selected nothing.
    #[tracing::instrument(skip_all, fields(notification_id = %request.id, target = %request.target_channel))]
    pub async fn dispatch(&self, request: &NotificationRequest) -> Vec<Delivery> {
        let kinds = TransportKind::selected_by(request.target_channel, &self.transport.available());
        let mut deliveries = Vec::with_capacity(kinds.len());
        for kind in kinds {
            deliveries.push(self.deliver(kind, request).await);
        }
        deliveries
    }

    async fn deliver(&self, kind: TransportKind, request: &NotificationRequest) -> Delivery {
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.transport.deliver(kind, request),
            )
            .await
            .unwrap_or(Err(TransportError::Timeout));

            let error = match result {
                Ok(()) => {
                    tracing::debug!(transport = %kind, attempts, "Notification delivered");
                    None
                }
                Err(err) if err.is_retryable() && attempts < self.policy.max_attempts => {
                    let wait = self.policy.backoff(attempts);
                    tracing::warn!(
                        transport = %kind,
                        attempts,
                        error = %err,
                        retry_in_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        "Notification attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(transport = %kind, attempts, error = %err, "Notification delivery failed");
                    Some(err)
                }
            };
            return Delivery {
                transport: kind,
                attempts,
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                error,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use greenhub_domain::id::{NotificationId, RuleId};
    use greenhub_domain::rule::{Priority, TargetChannel};

    fn request(target: TargetChannel) -> NotificationRequest {
        NotificationRequest {
            id: NotificationId::new(),
            rule_id: RuleId::new(),
            message: "pH 5.0 on tank-1".to_string(),
            priority: Priority::High,
            channel: "telegram".to_string(),
            target_channel: target,
            user: "greenhub".to_string(),
            metadata: serde_json::Map::new(),
            created_at: greenhub_domain::time::now(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn should_double_backoff_up_to_cap() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(1));
        assert_eq!(policy.backoff(60), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn should_deliver_on_first_attempt() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook]);
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Webhook)).await;

        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].succeeded());
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(transport.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_transient_failures_until_success() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook]).script(
            TransportKind::Webhook,
            vec![
                Err(TransportError::Unavailable("502".to_string())),
                Err(TransportError::Timeout),
            ],
        );
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Webhook)).await;

        assert!(deliveries[0].succeeded());
        assert_eq!(deliveries[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_give_up_after_max_attempts() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook]).script(
            TransportKind::Webhook,
            vec![Err(TransportError::Unavailable("503".to_string())); 5],
        );
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Webhook)).await;

        assert_eq!(deliveries[0].attempts, 3);
        assert!(matches!(
            deliveries[0].error,
            Some(TransportError::Unavailable(_))
        ));
        assert_eq!(transport.attempts(TransportKind::Webhook), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_rejected_request() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook]).script(
            TransportKind::Webhook,
            vec![Err(TransportError::Rejected {
                status: 400,
                reason: "bad payload".to_string(),
            })],
        );
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Webhook)).await;

        assert_eq!(deliveries[0].attempts, 1);
        assert!(!deliveries[0].succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_hanging_transport_and_retry() {
        let transport = ScriptedTransport::hanging(&[TransportKind::Telegram]);
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Telegram)).await;

        assert_eq!(deliveries[0].error, Some(TransportError::Timeout));
        assert_eq!(deliveries[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_fast_on_unconfigured_transport() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook]);
        let dispatcher = NotificationDispatcher::new(transport, policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::Email)).await;

        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(
            deliveries[0].error,
            Some(TransportError::NotConfigured(TransportKind::Email))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_fan_out_to_every_configured_transport_for_all() {
        let transport = ScriptedTransport::new(&[TransportKind::Webhook, TransportKind::Email]);
        let dispatcher = NotificationDispatcher::new(transport.clone(), policy());

        let deliveries = dispatcher.dispatch(&request(TargetChannel::All)).await;

        let kinds: Vec<_> = deliveries.iter().map(|d| d.transport).collect();
        assert_eq!(kinds, vec![TransportKind::Webhook, TransportKind::Email]);
        assert!(deliveries.iter().all(Delivery::succeeded));
    }
}
