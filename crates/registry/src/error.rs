//! Registry error types.

use thiserror::Error;

/// Errors raised by discovery backends and address parsing.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An address entry could not be parsed into an endpoint.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending address string.
        address: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The backend rejected a subscription.
    #[error("Subscription failed for {service}: {reason}")]
    SubscriptionFailed {
        /// Normalized service key.
        service: String,
        /// Backend-supplied reason.
        reason: String,
    },

    /// Unsubscribe for a service that was never subscribed.
    #[error("Not subscribed to {0}")]
    NotSubscribed(String),

    /// The subscription channel closed before the consumer did.
    #[error("Registry subscription channel closed")]
    ChannelClosed,

    /// Backend-specific error.
    #[error("Registry error: {0}")]
    Other(String),
}
