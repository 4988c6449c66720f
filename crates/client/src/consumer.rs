//! Service-level consumer: endpoint discovery, load balancing, dispatch.

use crate::connection::CallOptions;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use arc_swap::ArcSwap;
use dubbo_codec::CodecFactory;
use dubbo_registry::{Endpoint, Registry, RegistryError, SUPPORTED_SCHEME, ServiceDescriptor, Subscription};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Options for creating a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Service interface name.
    pub interface_name: String,
    /// Optional service version.
    pub version: Option<String>,
    /// Optional service group.
    pub group: Option<String>,
    /// Static `host:port` or URL entries, comma separated. When absent the
    /// consumer subscribes to the discovery backend instead.
    pub address: Option<String>,
    /// Overrides the URL-derived call timeout for every endpoint this
    /// consumer produces.
    pub call_timeout: Option<Duration>,
}

impl ConsumerOptions {
    /// Options for `interface_name` with registry-based discovery.
    #[must_use]
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            version: None,
            group: None,
            address: None,
            call_timeout: None,
        }
    }

    /// Set the service version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the service group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Use static addresses instead of registry discovery.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Override the per-call timeout for every endpoint.
    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// The service identity these options describe.
    #[must_use]
    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            interface_name: self.interface_name.clone(),
            version: self.version.clone(),
            group: self.group.clone(),
        }
    }
}

/// Client-side handle for one logical service.
///
/// Resolves the service to an endpoint list (statically or through the
/// registry), load-balances selections round-robin from a random offset,
/// and routes calls through the shared pool. Exactly one endpoint is tried
/// per invocation; there is no automatic failover.
pub struct Consumer<F: CodecFactory, R: Registry> {
    descriptor: ServiceDescriptor,
    pool: Arc<ConnectionPool<F>>,
    registry: Arc<R>,
    endpoints: Arc<ArcSwap<Vec<Endpoint>>>,
    cursor: Arc<AtomicUsize>,
    ready_rx: watch::Receiver<bool>,
    // Keeps static-mode readiness observable after the sender would
    // otherwise drop.
    _ready_tx: Option<watch::Sender<bool>>,
    subscribed: bool,
    update_task: Option<JoinHandle<()>>,
}

impl<F: CodecFactory, R: Registry> Consumer<F, R> {
    pub(crate) async fn new(
        options: ConsumerOptions,
        pool: Arc<ConnectionPool<F>>,
        registry: Arc<R>,
    ) -> Result<Self> {
        let descriptor = options.descriptor();
        let endpoints = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let cursor = Arc::new(AtomicUsize::new(0));

        if let Some(address) = &options.address {
            // Static mode: ready as soon as parsing completes.
            let mut parsed = Vec::new();
            for entry in address.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                parsed.push(Endpoint::parse(entry, &descriptor)?);
            }
            apply_timeout_override(&mut parsed, options.call_timeout);
            debug!("{} starts with {} static providers", descriptor, parsed.len());
            reseed(&cursor, parsed.len());
            endpoints.store(Arc::new(parsed));

            let (ready_tx, ready_rx) = watch::channel(true);
            Ok(Self {
                descriptor,
                pool,
                registry,
                endpoints,
                cursor,
                ready_rx,
                _ready_tx: Some(ready_tx),
                subscribed: false,
                update_task: None,
            })
        } else {
            // Push mode: ready on the first registry update.
            let (ready_tx, ready_rx) = watch::channel(false);
            let subscription = registry.subscribe(&descriptor).await?;
            let update_task = tokio::spawn(Self::update_loop(
                descriptor.clone(),
                subscription,
                endpoints.clone(),
                cursor.clone(),
                ready_tx,
                options.call_timeout,
            ));

            Ok(Self {
                descriptor,
                pool,
                registry,
                endpoints,
                cursor,
                ready_rx,
                _ready_tx: None,
                subscribed: true,
                update_task: Some(update_task),
            })
        }
    }

    async fn update_loop(
        descriptor: ServiceDescriptor,
        mut subscription: Subscription,
        endpoints: Arc<ArcSwap<Vec<Endpoint>>>,
        cursor: Arc<AtomicUsize>,
        ready_tx: watch::Sender<bool>,
        call_timeout: Option<Duration>,
    ) {
        while let Some(urls) = subscription.updates.recv().await {
            let mut parsed = Vec::new();
            for entry in &urls {
                // Only entries for the supported protocol are eligible.
                let url = match Url::parse(entry) {
                    Ok(url) if url.scheme() == SUPPORTED_SCHEME => url,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("ignoring unparseable address '{}' for {}: {}", entry, descriptor, e);
                        continue;
                    }
                };
                match Endpoint::from_url(&url, &descriptor) {
                    Ok(endpoint) => parsed.push(endpoint),
                    Err(e) => warn!("ignoring address '{}' for {}: {}", entry, descriptor, e),
                }
            }
            apply_timeout_override(&mut parsed, call_timeout);
            debug!("{} now has {} providers", descriptor, parsed.len());

            // One atomic swap; the cursor restarts at a random offset.
            reseed(&cursor, parsed.len());
            endpoints.store(Arc::new(parsed));
            let _ = ready_tx.send(true);
        }
        debug!("subscription stream for {} ended", descriptor);
    }

    /// Wait until the endpoint list is first available.
    ///
    /// # Errors
    ///
    /// Fails if the registry subscription ended before delivering a list.
    pub async fn ready(&self) -> Result<()> {
        let mut ready_rx = self.ready_rx.clone();
        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::Registry(RegistryError::ChannelClosed))
    }

    /// Pick the endpoint for the next call.
    ///
    /// Round-robin over the current list, starting from a random offset
    /// reseeded on every list replacement. Selection and advance are a
    /// single atomic step.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoProvider`] when the current list is empty; no
    /// I/O is attempted.
    pub fn select_endpoint(&self, method: &str) -> Result<Endpoint> {
        let endpoints = self.endpoints.load();
        if endpoints.is_empty() {
            return Err(Error::NoProvider {
                service: self.descriptor.service_key(),
                method: method.to_string(),
            });
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Ok(endpoints[index].clone())
    }

    /// Invoke `method` with `args` on one endpoint of this service.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the per-call failure modes.
    pub async fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        self.ready().await?;
        let endpoint = self.select_endpoint(method)?;
        let connection = self.pool.acquire(&endpoint).await?;
        connection.call(method, args, options).await
    }

    /// The service identity this consumer resolves.
    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Normalized service key.
    #[must_use]
    pub fn service_key(&self) -> String {
        self.descriptor.service_key()
    }

    /// Drop discovery without touching the registry subscription state.
    ///
    /// Used when a concurrently-created duplicate loses the consumer-cache
    /// race: unsubscribing here would tear down the winner's subscription.
    pub(crate) fn abandon(&self) {
        if let Some(task) = &self.update_task {
            task.abort();
        }
    }

    /// Stop discovery for this consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry rejects the unsubscribe.
    pub async fn close(&self) -> Result<()> {
        if self.subscribed {
            self.registry.unsubscribe(&self.descriptor).await?;
        }
        if let Some(task) = &self.update_task {
            task.abort();
        }
        Ok(())
    }
}

fn reseed(cursor: &AtomicUsize, len: usize) {
    let start = if len == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..len)
    };
    cursor.store(start, Ordering::Relaxed);
}

fn apply_timeout_override(endpoints: &mut [Endpoint], call_timeout: Option<Duration>) {
    if let Some(timeout) = call_timeout {
        for endpoint in endpoints {
            endpoint.call_timeout = timeout;
        }
    }
}
