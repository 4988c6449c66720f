//! One socket to one remote endpoint: request/response correlation,
//! per-call deadlines, and liveness monitoring.

use crate::error::{ConnectionError, Error, Result};
use bytes::BytesMut;
use dashmap::DashMap;
use dubbo_codec::packet::PROTOCOL_VERSION;
use dubbo_codec::{Codec, CodecError, Invocation, Packet, Request, Response};
use dubbo_registry::Endpoint;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, interval_at, timeout};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, error, warn};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the endpoint's configured call timeout.
    pub timeout: Option<Duration>,
    /// Caller-supplied attachments, applied over the computed defaults.
    pub attachments: HashMap<String, String>,
}

impl CallOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an attachment entry. Caller-supplied entries win over the
    /// computed defaults.
    #[must_use]
    pub fn attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }
}

/// Connection lifecycle states. `Closed` is terminal; there is no
/// reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket opening.
    Connecting,
    /// Socket connected, calls accepted.
    Ready,
    /// Explicit close, socket error, or fatal decode error.
    Closed,
}

/// Outbound frame for the write half.
enum Outbound {
    Request(Request),
    Response(Response),
}

/// Bridges a [`Codec`] onto `tokio_util`'s framed transport.
struct CodecBridge<C>(C);

impl<C: Codec> Decoder for CodecBridge<C> {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Packet>, CodecError> {
        self.0.decode(src)
    }
}

impl<C: Codec> Encoder<Outbound> for CodecBridge<C> {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> std::result::Result<(), CodecError> {
        match item {
            Outbound::Request(request) => self.0.encode_request(&request, dst),
            Outbound::Response(response) => self.0.encode_response(&response, dst),
        }
    }
}

type SinkHalf<C> = SplitSink<Framed<TcpStream, CodecBridge<C>>, Outbound>;
type StreamHalf<C> = SplitStream<Framed<TcpStream, CodecBridge<C>>>;
type SharedSink<C> = Arc<tokio::sync::Mutex<SinkHalf<C>>>;
type PendingCalls = Arc<DashMap<i64, oneshot::Sender<Result<Value>>>>;

/// A multiplexed connection to one remote `host:port`.
///
/// One connection may carry calls for many services; the service path
/// travels in each call's attachments, not in the connection identity.
pub struct Connection<C: Codec> {
    endpoint: Endpoint,
    address: String,
    state: Arc<RwLock<ConnectionState>>,
    sink: SharedSink<C>,
    pending: PendingCalls,
    next_id: Arc<AtomicI64>,
    closed_tx: watch::Sender<bool>,
}

impl<C: Codec> Connection<C> {
    /// Open a connection to `endpoint` and drive it to `Ready`.
    ///
    /// Failures during the connecting phase surface here and leave the
    /// connection `Closed`; failures after `Ready` are reported
    /// asynchronously and close the connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the socket cannot be established
    /// within `connect_timeout`.
    pub async fn open(endpoint: Endpoint, codec: C, connect_timeout: Duration) -> Result<Self> {
        let address = endpoint.remote_key();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        let stream = match timeout(connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                *state.write() = ConnectionState::Closed;
                return Err(ConnectionError::ConnectFailed { address, source }.into());
            }
            Err(_) => {
                *state.write() = ConnectionState::Closed;
                return Err(ConnectionError::ConnectTimeout {
                    address,
                    timeout: connect_timeout,
                }
                .into());
            }
        };
        if let Err(source) = stream.set_nodelay(true) {
            *state.write() = ConnectionState::Closed;
            return Err(ConnectionError::ConnectFailed { address, source }.into());
        }

        *state.write() = ConnectionState::Ready;
        debug!("connected to {}", address);

        let (sink, stream) = Framed::new(stream, CodecBridge(codec)).split();
        let sink: SharedSink<C> = Arc::new(tokio::sync::Mutex::new(sink));
        let pending: PendingCalls = Arc::new(DashMap::new());
        let next_id = Arc::new(AtomicI64::new(0));
        let (closed_tx, _) = watch::channel(false);

        // Subscribe before spawning so a close signal sent right after
        // `open` returns is never missed.
        tokio::spawn(Self::read_loop(
            endpoint.clone(),
            stream,
            sink.clone(),
            pending.clone(),
            state.clone(),
            closed_tx.clone(),
            closed_tx.subscribe(),
        ));
        if !endpoint.heartbeat_interval.is_zero() {
            tokio::spawn(Self::heartbeat_loop(
                endpoint.clone(),
                sink.clone(),
                pending.clone(),
                state.clone(),
                closed_tx.clone(),
                closed_tx.subscribe(),
                next_id.clone(),
            ));
        }

        Ok(Self {
            endpoint,
            address,
            state,
            sink,
            pending,
            next_id,
            closed_tx,
        })
    }

    /// Invoke `method` on the remote endpoint.
    ///
    /// The returned future settles exactly once: from the matched response,
    /// from its deadline, or from the connection closing.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the per-call failure modes.
    pub async fn call(&self, method: &str, args: Vec<Value>, options: CallOptions) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let call_timeout = options.timeout.unwrap_or(self.endpoint.call_timeout);

        // Computed defaults first; caller-supplied entries override them.
        let mut attachments = HashMap::from([
            ("dubbo".to_string(), PROTOCOL_VERSION.to_string()),
            ("path".to_string(), self.endpoint.path.clone()),
            ("interface".to_string(), self.endpoint.interface_name.clone()),
            ("version".to_string(), self.endpoint.version.clone()),
            ("timeout".to_string(), call_timeout.as_millis().to_string()),
        ]);
        attachments.extend(options.attachments);

        let request = Request::new(
            id,
            Invocation {
                method_name: method.to_string(),
                args,
                attachments,
            },
        );

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Outbound::Request(request)).await {
                drop(sink);
                self.pending.remove(&id);
                self.close();
                return Err(write_error(&self.address, e));
            }
        }

        match timeout(call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Forget the id so a stray late response can never match it.
                self.pending.remove(&id);
                Err(Error::CallTimeout {
                    timeout: call_timeout,
                    address: self.address.clone(),
                })
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the connection has reached `Closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// The endpoint this connection serves.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Close the connection.
    ///
    /// Idempotent. Outstanding calls are rejected with
    /// [`Error::ConnectionClosed`] rather than left to their deadlines, and
    /// close watchers are notified.
    pub fn close(&self) {
        Self::shutdown(&self.state, &self.pending, &self.closed_tx);
    }

    /// Wait until the connection reaches `Closed`.
    pub async fn closed(&self) {
        let mut closed_rx = self.closed_tx.subscribe();
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }

    fn shutdown(
        state: &RwLock<ConnectionState>,
        pending: &DashMap<i64, oneshot::Sender<Result<Value>>>,
        closed_tx: &watch::Sender<bool>,
    ) {
        {
            let mut state = state.write();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        let ids: Vec<i64> = pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = pending.remove(&id) {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
        }

        let _ = closed_tx.send(true);
    }

    async fn read_loop(
        endpoint: Endpoint,
        mut stream: StreamHalf<C>,
        sink: SharedSink<C>,
        pending: PendingCalls,
        state: Arc<RwLock<ConnectionState>>,
        closed_tx: watch::Sender<bool>,
        mut closed_rx: watch::Receiver<bool>,
    ) {
        let address = endpoint.remote_key();
        loop {
            tokio::select! {
                packet = stream.next() => match packet {
                    Some(Ok(packet)) => Self::dispatch(&address, packet, &pending, &sink).await,
                    Some(Err(e)) => {
                        // A decode failure on the inbound stream is fatal
                        // for this connection.
                        error!("fatal decode error: {} (address: {})", e, address);
                        break;
                    }
                    None => {
                        debug!("connection to {} closed by peer", address);
                        break;
                    }
                },
                _ = closed_rx.wait_for(|closed| *closed) => break,
            }
        }

        Self::shutdown(&state, &pending, &closed_tx);
        // Tear down the socket once the loop exits.
        let mut sink = sink.lock().await;
        let _ = sink.close().await;
    }

    async fn dispatch(address: &str, packet: Packet, pending: &PendingCalls, sink: &SharedSink<C>) {
        match packet {
            Packet::Response(response) => {
                if let Some((_, tx)) = pending.remove(&response.id) {
                    // Delivery happens on the waiter's own task, decoupled
                    // from the read loop.
                    let _ = tx.send(settle(response));
                } else if !response.event {
                    warn!(
                        "paired request not found for response {} from {}, maybe it was removed after its timeout",
                        response.id, address
                    );
                }
            }
            Packet::Request(request) if request.is_heartbeat() => {
                let reply = Response::heartbeat(request.id);
                let mut sink = sink.lock().await;
                if let Err(e) = sink.send(Outbound::Response(reply)).await {
                    warn!("failed to answer heartbeat from {}: {}", address, e);
                }
            }
            Packet::Request(request) => {
                warn!(
                    "cannot process inbound request packet {} from {}, this client serves no inbound calls",
                    request.id, address
                );
            }
        }
    }

    async fn heartbeat_loop(
        endpoint: Endpoint,
        sink: SharedSink<C>,
        pending: PendingCalls,
        state: Arc<RwLock<ConnectionState>>,
        closed_tx: watch::Sender<bool>,
        mut closed_rx: watch::Receiver<bool>,
        next_id: Arc<AtomicI64>,
    ) {
        let address = endpoint.remote_key();
        let period = endpoint.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // In-flight traffic already proves liveness; probe only
                    // when idle.
                    if *state.read() != ConnectionState::Ready || !pending.is_empty() {
                        continue;
                    }
                    let probe = Request::heartbeat(next_id.fetch_add(1, Ordering::Relaxed));
                    let mut sink = sink.lock().await;
                    if let Err(e) = sink.send(Outbound::Request(probe)).await {
                        warn!("heartbeat to {} failed: {}", address, e);
                        drop(sink);
                        Self::shutdown(&state, &pending, &closed_tx);
                        break;
                    }
                }
                _ = closed_rx.wait_for(|closed| *closed) => break,
            }
        }
    }
}

fn settle(response: Response) -> Result<Value> {
    if !response.is_success() {
        return Err(Error::RemoteSystem(
            response
                .error_msg
                .unwrap_or_else(|| "unknown server error".to_string()),
        ));
    }
    let result = response.result.unwrap_or_default();
    if let Some(exception) = result.exception {
        return Err(Error::RemoteApplication(exception));
    }
    Ok(result.value.unwrap_or(Value::Null))
}

fn write_error(address: &str, e: CodecError) -> Error {
    match e {
        CodecError::Io(source) => ConnectionError::WriteFailed {
            address: address.to_string(),
            source,
        }
        .into(),
        other => other.into(),
    }
}
