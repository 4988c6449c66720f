//! Top-level client facade: one cached consumer per service key over a
//! shared connection pool.

use crate::consumer::{Consumer, ConsumerOptions};
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PoolConfig};
use dashmap::DashMap;
use dubbo_codec::CodecFactory;
use dubbo_registry::Registry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for the client facade.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Application name, reported in logs.
    pub app_name: Option<String>,
    /// Connection pool configuration.
    pub pool: PoolConfig,
}

/// Builder for creating clients.
pub struct DubboClientBuilder<F, R> {
    registry: Option<Arc<R>>,
    codec_factory: Option<Arc<F>>,
    config: ClientConfig,
}

impl<F: CodecFactory, R: Registry> DubboClientBuilder<F, R> {
    /// Create a new client builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: None,
            codec_factory: None,
            config: ClientConfig::default(),
        }
    }

    /// Set the discovery backend.
    #[must_use]
    pub fn registry(mut self, registry: Arc<R>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the wire codec factory.
    #[must_use]
    pub fn codec_factory(mut self, codec_factory: Arc<F>) -> Self {
        self.codec_factory = Some(codec_factory);
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = Some(app_name.into());
        self
    }

    /// Set the connection pool configuration.
    #[must_use]
    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or codec factory is missing.
    pub fn build(self) -> Result<DubboClient<F, R>> {
        let registry = self
            .registry
            .ok_or_else(|| Error::Config("registry is required".to_string()))?;
        let codec_factory = self
            .codec_factory
            .ok_or_else(|| Error::Config("codec factory is required".to_string()))?;

        let pool = Arc::new(ConnectionPool::new(codec_factory, self.config.pool.clone()));

        Ok(DubboClient {
            registry,
            pool,
            consumers: DashMap::new(),
            config: self.config,
        })
    }
}

impl<F: CodecFactory, R: Registry> Default for DubboClientBuilder<F, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Client facade caching one [`Consumer`] per service key.
pub struct DubboClient<F: CodecFactory, R: Registry> {
    registry: Arc<R>,
    pool: Arc<ConnectionPool<F>>,
    consumers: DashMap<String, Arc<Consumer<F, R>>>,
    config: ClientConfig,
}

impl<F: CodecFactory, R: Registry> DubboClient<F, R> {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> DubboClientBuilder<F, R> {
        DubboClientBuilder::new()
    }

    /// Create a consumer for a service, or return the cached one.
    ///
    /// Consumers are cached by normalized service key, so differing
    /// version or group never collide.
    ///
    /// # Errors
    ///
    /// Returns an error if the addresses cannot be parsed or the registry
    /// rejects the subscription.
    pub async fn create_consumer(&self, options: ConsumerOptions) -> Result<Arc<Consumer<F, R>>> {
        let key = options.descriptor().service_key();
        if let Some(consumer) = self.consumers.get(&key) {
            warn!("consumer for {} already exists, reusing it", key);
            return Ok(consumer.clone());
        }

        debug!(app_name = ?self.config.app_name, "creating consumer for {}", key);
        let consumer = Arc::new(
            Consumer::new(options, self.pool.clone(), self.registry.clone()).await?,
        );
        let cached = self
            .consumers
            .entry(key)
            .or_insert_with(|| consumer.clone())
            .clone();
        if !Arc::ptr_eq(&cached, &consumer) {
            // Lost a concurrent creation race; keep the first instance.
            consumer.abandon();
        }
        Ok(cached)
    }

    /// The shared connection pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }

    /// Close every cached consumer and the shared pool.
    pub async fn close(&self) {
        let consumers: Vec<(String, Arc<Consumer<F, R>>)> = self
            .consumers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.consumers.clear();

        for (key, consumer) in consumers {
            if let Err(e) = consumer.close().await {
                warn!("failed to close consumer {}: {}", key, e);
            }
        }
        self.pool.close_all().await;
    }
}
