//! Notification adapter error types.

use greenhub_domain::error::GreenHubError;

/// Errors raised while setting up the HTTP transports.
///
/// Delivery failures are reported per attempt as
/// [`TransportError`](greenhub_app::ports::TransportError) instead.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),

    /// A configured endpoint is not a valid URL.
    #[error("invalid {transport} endpoint {url:?}")]
    InvalidEndpoint {
        transport: &'static str,
        url: String,
    },
}

impl From<NotifyError> for GreenHubError {
    fn from(err: NotifyError) -> Self {
        Self::Transport(Box::new(err))
    }
}
