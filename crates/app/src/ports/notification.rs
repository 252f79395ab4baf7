//! Notification transport port — outbound delivery of rendered notifications.

use std::future::Future;

use greenhub_domain::notification::{NotificationRequest, TransportKind};

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt did not complete within its deadline.
    #[error("delivery timed out")]
    Timeout,

    /// No endpoint is configured for this transport.
    #[error("transport {0} is not configured")]
    NotConfigured(TransportKind),

    /// The receiver refused the request; resending it will not help.
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// A transient failure (connection error, 5xx, …).
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// A set of delivery transports addressed by [`TransportKind`].
pub trait NotificationTransport {
    /// Transports that have an endpoint configured.
    fn available(&self) -> Vec<TransportKind>;

    /// Make one delivery attempt over `kind`.
    fn deliver(
        &self,
        kind: TransportKind,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
