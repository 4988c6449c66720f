//! Shared-connection cache keyed by remote endpoint.

use crate::connection::Connection;
use crate::error::Result;
use dashmap::DashMap;
use dubbo_codec::CodecFactory;
use dubbo_registry::Endpoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-key slot; the lock serializes construction so concurrent acquirers
/// for one remote key share the in-flight attempt.
type Slot<C> = Arc<Mutex<Option<Arc<Connection<C>>>>>;

/// One physical connection per remote `host:port`, shared across all
/// services routed to it.
pub struct ConnectionPool<F: CodecFactory> {
    codec_factory: Arc<F>,
    config: PoolConfig,
    connections: DashMap<String, Slot<F::Codec>>,
}

impl<F: CodecFactory> ConnectionPool<F> {
    /// Create a new pool.
    #[must_use]
    pub fn new(codec_factory: Arc<F>, config: PoolConfig) -> Self {
        Self {
            codec_factory,
            config,
            connections: DashMap::new(),
        }
    }

    /// Get the shared connection for `endpoint`, opening one if needed.
    ///
    /// At most one connection per remote key exists at any time, including
    /// during construction: concurrent acquirers await the in-flight
    /// attempt and receive the same instance. A pooled connection observed
    /// `Closed` here is evicted and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connection cannot be established.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<Arc<Connection<F::Codec>>> {
        let key = endpoint.remote_key();
        let slot = self
            .connections
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        if let Some(connection) = guard.as_ref() {
            if !connection.is_closed() {
                return Ok(connection.clone());
            }
            debug!("evicting closed connection to {}", key);
            *guard = None;
        }

        let codec = self.codec_factory.create(&endpoint.serialization);
        let connection = Arc::new(
            Connection::open(endpoint.clone(), codec, self.config.connect_timeout).await?,
        );
        *guard = Some(connection.clone());
        drop(guard);

        // Evict on close, unless a replacement already took the slot.
        let watched = connection.clone();
        tokio::spawn(async move {
            watched.closed().await;
            let mut guard = slot.lock().await;
            if guard
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &watched))
            {
                debug!(
                    "removing closed connection to {} from pool",
                    watched.endpoint().remote_key()
                );
                *guard = None;
            }
        });

        Ok(connection)
    }

    /// Close every pooled connection and clear the map.
    pub async fn close_all(&self) {
        let slots: Vec<Slot<F::Codec>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for slot in slots {
            if let Some(connection) = slot.lock().await.take() {
                connection.close();
            }
        }
        self.connections.clear();
    }
}
