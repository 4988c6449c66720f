//! Error types for the RPC client.

use dubbo_codec::CodecError;
use dubbo_registry::RegistryError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-related errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Codec errors on the wire.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Discovery backend errors.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No matching response arrived within the call's deadline.
    #[error("Server no response in {}ms, address#{address}", .timeout.as_millis())]
    CallTimeout {
        /// The effective timeout that expired.
        timeout: Duration,
        /// Remote `host:port` the call was routed to.
        address: String,
    },

    /// Protocol-level failure status from the peer.
    #[error("Remote system error: {0}")]
    RemoteSystem(String),

    /// Successful protocol response carrying a business error payload.
    #[error("Remote application error: {0}")]
    RemoteApplication(String),

    /// Endpoint list was empty at selection time.
    #[error("No provider for {service}::{method}(), address list is empty")]
    NoProvider {
        /// Normalized service key.
        service: String,
        /// The method that was being invoked.
        method: String,
    },

    /// The owning connection closed while the call was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Connection-specific errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish the connection.
    #[error("Failed to connect to {address}: {source}")]
    ConnectFailed {
        /// The address we tried to connect to.
        address: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Connecting took longer than the configured timeout.
    #[error("Timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout {
        /// The address we tried to connect to.
        address: String,
        /// The connect timeout that expired.
        timeout: Duration,
    },

    /// A socket write failed.
    #[error("Failed to write to {address}: {source}")]
    WriteFailed {
        /// Remote `host:port`.
        address: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}
