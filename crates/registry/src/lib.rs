//! Service discovery contract for the Dubbo RPC client.
//!
//! This crate provides:
//! - Service identity types ([`ServiceDescriptor`], normalized service keys)
//! - Endpoint parsing ([`Endpoint`])
//! - The [`Registry`] trait push-based discovery backends implement
//!
//! Concrete backends (ZooKeeper, Nacos, the in-process memory registry used
//! in tests) live in separate crates.

pub mod descriptor;
pub mod endpoint;
pub mod error;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use descriptor::ServiceDescriptor;
pub use endpoint::Endpoint;
pub use error::RegistryError;

/// URL scheme of endpoints this client can talk to.
pub const SUPPORTED_SCHEME: &str = "dubbo";

/// A live subscription to one service's endpoint list.
///
/// Each update carries the *complete current* ordered endpoint URL list for
/// the service, never a delta.
#[derive(Debug)]
pub struct Subscription {
    /// Stream of full endpoint URL lists.
    pub updates: mpsc::UnboundedReceiver<Vec<String>>,
}

/// Push-based discovery backend.
///
/// Backends key subscriptions by the descriptor's normalized service key and
/// push the full address list on every change.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Subscribe to endpoint updates for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the subscription.
    async fn subscribe(&self, descriptor: &ServiceDescriptor)
    -> Result<Subscription, RegistryError>;

    /// Cancel the subscription for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription exists for the descriptor.
    async fn unsubscribe(&self, descriptor: &ServiceDescriptor) -> Result<(), RegistryError>;
}
