//! In-process discovery backend.
//!
//! Routes endpoint lists between publishers and subscribers within the same
//! process, perfect for testing and development scenarios. New subscribers
//! immediately receive the last published list for their service.

use async_trait::async_trait;
use dashmap::DashMap;
use dubbo_registry::{Registry, RegistryError, ServiceDescriptor, Subscription};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct ServiceEntry {
    urls: Option<Vec<String>>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<String>>>,
}

/// In-memory registry keyed by normalized service key.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: DashMap<String, ServiceEntry>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the complete current endpoint URL list for a service and
    /// push it to every live subscriber.
    pub fn publish(&self, descriptor: &ServiceDescriptor, urls: Vec<String>) {
        let key = descriptor.service_key();
        debug!("publishing {} endpoints for {}", urls.len(), key);

        let mut entry = self.services.entry(key).or_default();
        entry.urls = Some(urls.clone());
        entry
            .subscribers
            .retain(|subscriber| subscriber.send(urls.clone()).is_ok());
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn subscribe(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Subscription, RegistryError> {
        let key = descriptor.service_key();
        debug!("subscribing to {}", key);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut entry = self.services.entry(key).or_default();
        // Replay the last published list so late subscribers catch up.
        if let Some(urls) = &entry.urls {
            let _ = tx.send(urls.clone());
        }
        entry.subscribers.push(tx);

        Ok(Subscription { updates: rx })
    }

    async fn unsubscribe(&self, descriptor: &ServiceDescriptor) -> Result<(), RegistryError> {
        let key = descriptor.service_key();
        debug!("unsubscribing from {}", key);

        match self.services.get_mut(&key) {
            Some(mut entry) if !entry.subscribers.is_empty() => {
                entry.subscribers.clear();
                Ok(())
            }
            _ => Err(RegistryError::NotSubscribed(key)),
        }
    }
}
