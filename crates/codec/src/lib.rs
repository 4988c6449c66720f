//! Wire codec contract for the Dubbo RPC client.
//!
//! This crate defines the packet model exchanged with a remote peer and the
//! codec traits the client core programs against. Concrete byte layouts
//! (hessian2, the framed-JSON reference codec, ...) live in separate crates;
//! the core is agnostic to them.

pub mod error;
pub mod packet;

use bytes::BytesMut;

pub use error::CodecError;
pub use packet::{Invocation, Packet, Request, Response, RpcResult};

/// Stateful wire codec for one connection.
///
/// `decode` is incremental: it consumes at most one full frame from `src`
/// and returns `None` when more bytes are needed, mirroring
/// `tokio_util::codec::Decoder`. Implementations may keep per-stream state,
/// so one codec instance serves exactly one connection.
pub trait Codec: Send + 'static {
    /// Decode the next packet from the inbound buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer holds a malformed frame. Decode errors
    /// are fatal for the connection that owns this codec.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError>;

    /// Append one encoded request frame to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    fn encode_request(&mut self, request: &Request, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Append one encoded response frame to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be serialized.
    fn encode_response(&mut self, response: &Response, dst: &mut BytesMut)
    -> Result<(), CodecError>;
}

/// Factory producing one codec instance per connection.
///
/// The endpoint's configured serialization name (e.g. `"hessian2"`) selects
/// the payload encoding.
pub trait CodecFactory: Send + Sync + 'static {
    /// The codec type this factory produces.
    type Codec: Codec;

    /// Create a fresh codec for a new connection.
    fn create(&self, serialization: &str) -> Self::Codec;
}
